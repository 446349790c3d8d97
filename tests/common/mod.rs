#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use serde_json::{Value, json};
use telemetry_table::prelude::*;
use tokio::sync::oneshot;

// ================================================================================================
// Mock Provider
// ================================================================================================

/// A historical request captured by [`MockProvider`], answered by the test.
#[derive(Debug)]
pub struct PendingRequest {
    pub entity: EntityKey,
    pub options: RequestOptions,
    reply: oneshot::Sender<TelemetryResult<Vec<Value>>>,
}

impl PendingRequest {
    pub fn respond(self, data: Vec<Value>) {
        let _ = self.reply.send(Ok(data));
    }

    pub fn fail(self) {
        let _ = self.reply.send(Err(RequestError::Historical {
            entity: self.entity.to_string(),
            msg: "archive unavailable".to_string(),
        }
        .into()));
    }
}

/// In-memory provider for `serde_json::Value` datums keyed by `utc` and
/// `met`. Requests stay pending until the test answers them; realtime data is
/// pushed by hand.
#[derive(Debug)]
pub struct MockProvider {
    metadata: TelemetryMetadata,
    requests_tx: async_channel::Sender<PendingRequest>,
    requests_rx: async_channel::Receiver<PendingRequest>,
    feeds: Mutex<HashMap<EntityKey, Vec<async_channel::Sender<Value>>>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        let (requests_tx, requests_rx) = async_channel::unbounded();
        Arc::new(Self {
            metadata: metadata(),
            requests_tx,
            requests_rx,
            feeds: Mutex::default(),
        })
    }

    /// Waits for the next historical request.
    pub async fn next_request(&self) -> PendingRequest {
        tokio::time::timeout(Duration::from_secs(1), self.requests_rx.recv())
            .await
            .expect("no historical request was issued")
            .expect("request channel closed")
    }

    pub fn has_pending_request(&self) -> bool {
        !self.requests_rx.is_empty()
    }

    /// Pushes `datum` to every open subscription of `entity`.
    /// Returns the number of subscriptions reached.
    pub fn push(&self, entity: &str, datum: Value) -> usize {
        let mut feeds = self.feeds.lock().unwrap();
        let Some(senders) = feeds.get_mut(&EntityKey::from(entity)) else {
            return 0;
        };
        senders.retain(|tx| tx.try_send(datum.clone()).is_ok());
        senders.len()
    }

    pub fn open_feeds(&self, entity: &str) -> usize {
        let mut feeds = self.feeds.lock().unwrap();
        feeds
            .get_mut(&EntityKey::from(entity))
            .map(|senders| {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            })
            .unwrap_or_default()
    }

    pub fn as_provider(self: &Arc<Self>) -> Arc<dyn TelemetryProvider<Value>> {
        Arc::clone(self) as Arc<dyn TelemetryProvider<Value>>
    }
}

impl TelemetryProvider<Value> for MockProvider {
    fn metadata(&self, entity: &EntityKey) -> TelemetryResult<TelemetryMetadata> {
        if entity.as_str().starts_with("unknown") {
            return Err(RequestError::MissingMetadata(entity.to_string()).into());
        }
        Ok(self.metadata.clone())
    }

    fn format_map(&self, metadata: &TelemetryMetadata) -> FormatMap<Value> {
        JsonFormatter::format_map(metadata)
    }

    fn request(
        &self,
        entity: &EntityKey,
        options: RequestOptions,
    ) -> BoxFuture<'static, TelemetryResult<Vec<Value>>> {
        let (reply, response) = oneshot::channel();
        let _ = self.requests_tx.try_send(PendingRequest {
            entity: entity.clone(),
            options,
            reply,
        });
        async move {
            response
                .await
                .unwrap_or_else(|_| Err(RequestError::Abandoned.into()))
        }
        .boxed()
    }

    fn subscribe(&self, entity: &EntityKey) -> TelemetryResult<Subscription<Value>> {
        let (tx, rx) = async_channel::unbounded();
        self.feeds
            .lock()
            .unwrap()
            .entry(entity.clone())
            .or_default()
            .push(tx);
        Ok(Subscription::new(entity.clone(), rx))
    }
}

// ================================================================================================
// Fixtures
// ================================================================================================

pub fn metadata() -> TelemetryMetadata {
    TelemetryMetadata::new(vec![
        ValueMetadata::domain("utc", "utc", 1),
        ValueMetadata::domain("met", "number", 2),
        ValueMetadata::range("value", 1),
    ])
}

/// A datum at `utc = t`, with mission elapsed time running backwards so that
/// re-sorting by `met` reverses the order.
pub fn datum(t: i64) -> Value {
    json!({ "utc": t, "met": 1_000 - t, "value": t as f64 / 10.0 })
}

pub fn utc_of(row: &TelemetryRow<Value>) -> i64 {
    row.datum()["utc"].as_i64().unwrap()
}

pub fn bounds(start: f64, end: f64) -> Bounds {
    Bounds::new(start, end).unwrap()
}

pub fn context(start: f64, end: f64) -> TimeContext {
    TimeContext::new(TimeSystem::utc(), bounds(start, end))
}

/// Waits for the next event, failing the test after one second.
pub async fn next_event<T>(rx: &async_channel::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Lets spawned tasks drain their inputs.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}
