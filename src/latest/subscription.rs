use std::sync::Arc;

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{SystemError, TelemetryResult},
    latest::reconciler::{HistoricalRequest, LatestValueReconciler, RequestToken},
    telemetry::{EntityKey, TelemetryProvider},
    time::TimeContext,
};

type Response<D> = BoxFuture<'static, (RequestToken, TelemetryResult<Vec<D>>)>;

/// Keeps a consumer up to date with the latest value of one entity.
///
/// Owns a [`LatestValueReconciler`] on a tokio task that reacts to
/// time-system and clock changes of the [`TimeContext`], resolves historical
/// requests as they complete and offers every realtime push. Superseded
/// requests are not cancelled; their responses are discarded by token.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct LatestValueSubscription {
    entity: EntityKey,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LatestValueSubscription {
    /// Subscribes to `entity` and issues the first "latest" request under the
    /// active time system. `callback` runs on the spawned task.
    ///
    /// Must be called from within a tokio runtime.
    #[tracing::instrument(skip(provider, ctx, callback), fields(entity = %entity))]
    pub fn spawn<D, C>(
        entity: EntityKey,
        provider: Arc<dyn TelemetryProvider<D>>,
        ctx: TimeContext,
        callback: C,
    ) -> TelemetryResult<Self>
    where
        D: Clone + Send + Sync + 'static,
        C: FnMut(D) + Send + 'static,
    {
        let metadata = provider.metadata(&entity)?;
        let formats = provider.format_map(&metadata);
        let subscription = provider.subscribe(&entity)?;

        let mut ts_rx = ctx.watch_time_system();
        let mut clock_rx = ctx.watch_clock();
        let time_system = ctx.time_system();
        let mut reconciler = LatestValueReconciler::new(entity.clone(), formats, ctx, callback);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_entity = entity.clone();

        let handle = tokio::spawn(async move {
            let mut inflight: FuturesUnordered<Response<D>> = FuturesUnordered::new();
            if let Some(req) = reconciler.update_time_system(&time_system) {
                inflight.push(issue(provider.as_ref(), &task_entity, req));
            }
            let mut realtime_open = true;

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    Ok(()) = ts_rx.changed() => {
                        let time_system = ts_rx.borrow_and_update().clone();
                        if let Some(req) = reconciler.update_time_system(&time_system) {
                            inflight.push(issue(provider.as_ref(), &task_entity, req));
                        }
                    }

                    Ok(()) = clock_rx.changed() => {
                        let clock = clock_rx.borrow_and_update().clone();
                        reconciler.update_clock(clock.as_ref());
                    }

                    Some((request, result)) = inflight.next(), if !inflight.is_empty() => {
                        let delivery = reconciler.resolve_historical(request, result);
                        tracing::trace!(?delivery, "Historical response applied");
                    }

                    datum = subscription.recv(), if realtime_open => match datum {
                        Some(datum) => {
                            let delivery = reconciler.callback_if_latest(datum);
                            tracing::trace!(?delivery, "Realtime datum offered");
                        }
                        None => {
                            tracing::debug!("Realtime feed closed");
                            realtime_open = false;
                        }
                    },
                }
            }

            reconciler.unsubscribe();
            subscription.unsubscribe();
        });

        Ok(Self {
            entity,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops delivery. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(entity = %self.entity, "Unsubscribing latest value");
            self.cancel.cancel();
        }
    }

    /// Unsubscribes and waits for the task to wind down.
    pub async fn join(mut self) -> TelemetryResult<()> {
        self.unsubscribe();
        if let Some(handle) = self.handle.take() {
            handle.await.map_err(SystemError::from)?;
        }
        Ok(())
    }
}

impl Drop for LatestValueSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn issue<D>(
    provider: &dyn TelemetryProvider<D>,
    entity: &EntityKey,
    req: HistoricalRequest,
) -> Response<D>
where
    D: Send + 'static,
{
    let response = provider.request(entity, req.options);
    let token = req.token;
    async move { (token, response.await) }.boxed()
}
