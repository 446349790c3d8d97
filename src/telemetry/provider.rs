use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    error::TelemetryResult,
    telemetry::{EntityKey, format::FormatMap, metadata::TelemetryMetadata},
    time::Bounds,
};

// ================================================================================================
// Request Options
// ================================================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStrategy {
    /// Only the most recent datum(s) at or before `end`.
    Latest,
    /// Decimated min/max pairs for plotting.
    MinMax,
}

/// Options of a historical telemetry request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub strategy: Option<RequestStrategy>,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    /// Time-system key the `start`/`end` are expressed in.
    #[serde(default)]
    pub domain: Option<String>,
}

impl RequestOptions {
    /// The "latest available data" request: `{ strategy: latest, size: 1 }`.
    pub fn latest() -> Self {
        Self {
            strategy: Some(RequestStrategy::Latest),
            size: Some(1),
            ..Self::default()
        }
    }

    pub fn with_bounds(self, bounds: Bounds) -> Self {
        Self {
            start: Some(bounds.start),
            end: Some(bounds.end),
            ..self
        }
    }

    pub fn with_domain(self, domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..self
        }
    }

    pub fn with_size(self, size: usize) -> Self {
        Self {
            size: Some(size),
            ..self
        }
    }

    pub fn is_latest(&self) -> bool {
        self.strategy == Some(RequestStrategy::Latest)
    }
}

// ================================================================================================
// Subscription
// ================================================================================================

/// A realtime feed for one entity, delivering one datum per push.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`]) closes
/// the channel; providers observe the closed sender and stop pushing.
#[derive(Debug)]
pub struct Subscription<D> {
    entity: EntityKey,
    rx: async_channel::Receiver<D>,
}

impl<D> Subscription<D> {
    pub fn new(entity: EntityKey, rx: async_channel::Receiver<D>) -> Self {
        Self { entity, rx }
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    /// Waits for the next push. Returns `None` once the feed is closed.
    pub async fn recv(&self) -> Option<D> {
        self.rx.recv().await.ok()
    }

    pub fn try_recv(&self) -> Option<D> {
        self.rx.try_recv().ok()
    }

    pub fn is_active(&self) -> bool {
        !self.rx.is_closed()
    }

    /// Detaches from the feed. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if self.rx.close() {
            tracing::debug!(entity = %self.entity, "Realtime subscription closed");
        }
    }
}

impl<D> Drop for Subscription<D> {
    fn drop(&mut self) {
        self.rx.close();
    }
}

// ================================================================================================
// Provider
// ================================================================================================

/// Access to telemetry metadata, history and realtime pushes.
pub trait TelemetryProvider<D>: Send + Sync {
    fn metadata(&self, entity: &EntityKey) -> TelemetryResult<TelemetryMetadata>;

    fn format_map(&self, metadata: &TelemetryMetadata) -> FormatMap<D>;

    /// Historical query. The returned future owns everything it needs so that
    /// callers may keep several requests in flight.
    fn request(
        &self,
        entity: &EntityKey,
        options: RequestOptions,
    ) -> BoxFuture<'static, TelemetryResult<Vec<D>>>;

    fn subscribe(&self, entity: &EntityKey) -> TelemetryResult<Subscription<D>>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn latest_request_is_size_one() {
        let options = RequestOptions::latest();
        assert!(options.is_latest());
        assert_eq!(options.size, Some(1));
        assert_eq!(options.start, None);
    }

    #[test]
    fn strategy_round_trips_through_strings() {
        assert_eq!("latest".parse::<RequestStrategy>().unwrap(), RequestStrategy::Latest);
        assert_eq!(RequestStrategy::MinMax.to_string(), "minmax");
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_feed() {
        let (tx, rx) = async_channel::unbounded();
        let sub = Subscription::new(EntityKey::from("sat.battery"), rx);

        tx.send(1).await.unwrap();
        assert_eq!(sub.recv().await, Some(1));

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert!(tx.send(2).await.is_err());
    }
}
