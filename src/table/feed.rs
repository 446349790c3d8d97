use std::sync::Arc;

use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream, FuturesUnordered, SelectAll},
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::TableConfig,
    error::{CollectionError, SystemError, TelemetryError, TelemetryResult},
    table::{bounded::BoundedRowCollection, event::RowEvent, row::TelemetryRow},
    telemetry::{EntityKey, FormatMap, Subscription, TelemetryProvider},
    time::{Bounds, TimeContext, TimeSystem},
};

type RangeResponse<D> = BoxFuture<'static, (u64, EntityKey, TelemetryResult<Vec<D>>)>;

/// Keeps a [`BoundedRowCollection`] filled for a set of entities.
///
/// On start the feed sorts by the active time system, requests the history of
/// the current bounds for every entity and adds each response as one batch.
/// Realtime pushes are then added one by one while bounds ticks move the
/// window.
///
/// A time-system switch or a bounds regression is recovered by a full
/// reset and requery. Range responses issued before the reset are discarded
/// by generation.
///
/// # Examples
///
/// ```rust,ignore
/// let (feed, events) = TelemetryTableFeed::spawn(entities, provider, ctx, TableConfig::default())?;
/// while let Ok(event) = events.recv().await {
///     render(event);
/// }
/// let rows = feed.stop().await?;
/// ```
#[derive(Debug)]
pub struct TelemetryTableFeed<D> {
    cancel: CancellationToken,
    handle: JoinHandle<TelemetryResult<BoundedRowCollection<D>>>,
}

impl<D> TelemetryTableFeed<D>
where
    D: Send + Sync + 'static,
{
    /// Starts the feed and returns it with a listener for the visible rows.
    ///
    /// Metadata lookup and subscription happen before the task starts, so
    /// their errors are returned here. The formatters of all entities are
    /// merged by value key; the first entity to declare a key wins.
    #[tracing::instrument(skip_all, fields(entities = entities.len()))]
    pub fn spawn(
        entities: Vec<EntityKey>,
        provider: Arc<dyn TelemetryProvider<D>>,
        ctx: TimeContext,
        config: TableConfig,
    ) -> TelemetryResult<(Self, async_channel::Receiver<RowEvent<D>>)> {
        let mut formats = FormatMap::new();
        let mut realtime = Vec::with_capacity(entities.len());
        for entity in &entities {
            let metadata = provider.metadata(entity)?;
            let entity_formats = provider.format_map(&metadata);
            for value in &metadata.values {
                if formats.contains_key(&value.key) {
                    continue;
                }
                if let Some(formatter) = entity_formats.get(&value.key) {
                    formats.insert(formatter);
                }
            }
            realtime.push(realtime_stream(provider.subscribe(entity)?));
        }

        let mut collection = BoundedRowCollection::with_context(formats, &ctx)?;
        let events = collection.subscribe();

        let cancel = CancellationToken::new();
        let driver = FeedDriver {
            bounds_rx: ctx.watch_bounds(),
            time_system_rx: ctx.watch_time_system(),
            collection,
            provider,
            ctx,
            entities,
            config,
            generation: 0,
            inflight: FuturesUnordered::new(),
            realtime: stream::select_all(realtime),
        };
        let handle = tokio::spawn(driver.run(cancel.clone()));

        Ok((Self { cancel, handle }, events))
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the feed and hands back the collection as it was at shutdown.
    ///
    /// Returns the error that ended the feed early, if any.
    pub async fn stop(self) -> TelemetryResult<BoundedRowCollection<D>> {
        self.cancel.cancel();
        self.handle.await.map_err(SystemError::from)?
    }
}

fn realtime_stream<D>(subscription: Subscription<D>) -> BoxStream<'static, (EntityKey, D)>
where
    D: Send + 'static,
{
    stream::unfold(subscription, |sub| async move {
        let datum = sub.recv().await?;
        Some(((sub.entity().clone(), datum), sub))
    })
    .boxed()
}

// ================================================================================================
// Driver
// ================================================================================================

struct FeedDriver<D> {
    collection: BoundedRowCollection<D>,
    provider: Arc<dyn TelemetryProvider<D>>,
    ctx: TimeContext,
    entities: Vec<EntityKey>,
    config: TableConfig,
    bounds_rx: watch::Receiver<Bounds>,
    time_system_rx: watch::Receiver<TimeSystem>,
    generation: u64,
    inflight: FuturesUnordered<RangeResponse<D>>,
    realtime: SelectAll<BoxStream<'static, (EntityKey, D)>>,
}

impl<D> FeedDriver<D>
where
    D: Send + Sync + 'static,
{
    async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> TelemetryResult<BoundedRowCollection<D>> {
        self.requery(self.ctx.bounds())?;
        let mut realtime_open = !self.realtime.is_empty();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Ok(()) = self.time_system_rx.changed() => {
                    let time_system = self.time_system_rx.borrow_and_update().clone();
                    tracing::debug!(key = %time_system.key, "Time system changed, requerying");
                    self.collection.sort_by_time_system(&time_system)?;
                    self.requery(self.ctx.bounds())?;
                }

                Ok(()) = self.bounds_rx.changed() => {
                    self.bounds_rx.mark_unchanged();
                    let applied = self.collection.apply_pending_bounds();
                    self.recover(applied)?;
                }

                Some((generation, entity, result)) = self.inflight.next(), if !self.inflight.is_empty() => {
                    self.on_range_response(generation, entity, result)?;
                }

                pushed = self.realtime.next(), if realtime_open => match pushed {
                    Some((entity, datum)) => {
                        let placed = self.collection.add_one(TelemetryRow::new(entity, datum));
                        self.recover(placed)?;
                    }
                    None => {
                        tracing::debug!("All realtime feeds closed");
                        realtime_open = false;
                    }
                },
            }
        }

        self.collection.destroy();
        tracing::debug!(rows = self.collection.len(), "Table feed stopped");
        Ok(self.collection)
    }

    /// Issues a range request per entity for `bounds` after dropping every
    /// row and superseding requests still in flight.
    fn requery(&mut self, bounds: Bounds) -> TelemetryResult<()> {
        self.collection.reset(bounds)?;
        self.generation += 1;

        let domain = self.ctx.time_system().key;
        for entity in &self.entities {
            let options = self
                .config
                .historical
                .clone()
                .with_bounds(bounds)
                .with_domain(domain.clone());
            let response = self.provider.request(entity, options);
            let generation = self.generation;
            let entity = entity.clone();
            self.inflight
                .push(async move { (generation, entity, response.await) }.boxed());
        }
        tracing::debug!(
            generation = self.generation,
            bounds = %bounds,
            requests = self.entities.len(),
            "Historical range requested"
        );
        Ok(())
    }

    /// Turns a bounds regression into a reset and requery when configured to.
    fn recover<T>(&mut self, result: TelemetryResult<T>) -> TelemetryResult<()> {
        match result {
            Ok(_) => Ok(()),
            Err(TelemetryError::Collection(CollectionError::BoundsRegression { .. }))
                if self.config.requery_on_regression =>
            {
                tracing::warn!("Bounds moved backwards, requerying");
                self.requery(self.ctx.bounds())
            }
            Err(e) => Err(e),
        }
    }

    fn on_range_response(
        &mut self,
        generation: u64,
        entity: EntityKey,
        result: TelemetryResult<Vec<D>>,
    ) -> TelemetryResult<()> {
        if generation != self.generation {
            tracing::debug!(
                %entity,
                stale = generation,
                current = self.generation,
                "Discarding superseded range response"
            );
            return Ok(());
        }

        match result {
            Ok(data) => {
                let rows = data
                    .into_iter()
                    .map(|datum| TelemetryRow::new(entity.clone(), datum));
                let added = self.collection.add_many(rows);
                self.recover(added)
            }
            Err(e) => {
                tracing::warn!(%entity, error = %e, "Historical range request failed");
                Ok(())
            }
        }
    }
}
