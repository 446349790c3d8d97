use tokio::sync::watch;

use crate::{
    error::{CollectionError, TelemetryResult},
    table::{
        event::RowEvent,
        row::TelemetryRow,
        sorted::{SortOptions, SortedCollection},
    },
    telemetry::{EntityKey, FormatMap, SharedFormatter},
    time::{Bounds, TimeContext, TimeSystem},
};

/// Where [`BoundedRowCollection::add_one`] put a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Visible; the index is the row's position among the in-bounds rows.
    InBounds(usize),
    /// Newer than the window; held until the bounds catch up.
    Future(usize),
    /// Older than the window start; dropped without a notification.
    Discarded,
}

impl Placement {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::InBounds(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub in_bounds: usize,
    pub future: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundsOutcome {
    /// Visible rows removed from the front of the window.
    pub discarded: usize,
    /// Buffered rows that became visible.
    pub promoted: usize,
    /// Buffered rows the window skipped over entirely; never visible.
    pub skipped: usize,
}

impl BoundsOutcome {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// The rows of a table view, restricted to the active time window.
///
/// Two [`SortedCollection`]s share the same ascending time key: `in_bounds`
/// holds what is visible, `future` holds rows that arrived ahead of the
/// window. Bounds ticks move rows between them without rescanning: the
/// window start discards a prefix of `in_bounds` and the window end promotes
/// a prefix of `future`, both located by binary search.
///
/// # Bounds precondition
///
/// The incremental protocol is only correct while `start` and `end` never
/// decrease. A decreasing update is rejected with
/// [`CollectionError::BoundsRegression`]; the caller is expected to
/// [`reset`](Self::reset) and requery.
///
/// # Call order
///
/// When attached to a [`TimeContext`], pending bounds changes are applied
/// before any row is classified, so a row added after a tick is always judged
/// against the window of that tick.
///
/// # Unparseable rows
///
/// A row whose time cannot be parsed is neither before nor after the window
/// and is kept visible at the end of `in_bounds`.
#[derive(Debug)]
pub struct BoundedRowCollection<D> {
    in_bounds: SortedCollection<D>,
    future: SortedCollection<D>,
    last_bounds: Bounds,
    formats: FormatMap<D>,
    formatter: Option<SharedFormatter<D>>,
    bounds_rx: Option<watch::Receiver<Bounds>>,
}

impl<D> BoundedRowCollection<D> {
    /// Creates a detached collection. Rows can be added once
    /// [`sort_by_time_system`](Self::sort_by_time_system) has been called.
    pub fn new(formats: FormatMap<D>, bounds: Bounds) -> Self {
        Self {
            in_bounds: SortedCollection::new(),
            future: SortedCollection::new(),
            last_bounds: bounds,
            formats,
            formatter: None,
            bounds_rx: None,
        }
    }

    /// Creates a collection sorted by the context's time system and attached
    /// to its bounds notifications.
    pub fn with_context(formats: FormatMap<D>, ctx: &TimeContext) -> TelemetryResult<Self> {
        let mut collection = Self::new(formats, ctx.bounds());
        collection.sort_by_time_system(&ctx.time_system())?;
        collection.subscribe_to_bounds(ctx);
        Ok(collection)
    }

    // ============================================================================================
    // Accessors
    // ============================================================================================

    pub fn last_bounds(&self) -> Bounds {
        self.last_bounds
    }

    pub fn sort_options(&self) -> Option<&SortOptions> {
        self.in_bounds.options()
    }

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.in_bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_bounds.is_empty()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// Visible rows in time order.
    pub fn rows(&self) -> impl Iterator<Item = &TelemetryRow<D>> {
        self.in_bounds.rows()
    }

    pub fn future_rows(&self) -> impl Iterator<Item = &TelemetryRow<D>> {
        self.future.rows()
    }

    pub fn in_bounds(&self) -> &SortedCollection<D> {
        &self.in_bounds
    }

    pub fn future(&self) -> &SortedCollection<D> {
        &self.future
    }

    /// Listener for changes to the visible rows. The future buffer is silent.
    ///
    /// The channel is unbounded: a listener that stays alive must keep
    /// draining it, or drop the receiver to be pruned on the next event.
    /// An undrained live receiver grows with every change.
    pub fn subscribe(&mut self) -> async_channel::Receiver<RowEvent<D>> {
        self.in_bounds.subscribe()
    }

    // ============================================================================================
    // Time System
    // ============================================================================================

    /// Re-keys both buffers on the time system's value key, ascending, and
    /// splits them again against the last applied bounds.
    ///
    /// Rows are pooled and re-sorted in full, then each lands where
    /// [`add_one`](Self::add_one) would place it now: past the end into the
    /// future buffer, before the start dropped, anything else visible.
    /// Listeners get a single `Sorted` and re-read the rows.
    ///
    /// Returns the number of rows dropped. Callers switching time systems
    /// usually reset and requery afterwards anyway.
    #[tracing::instrument(skip_all, fields(key = %time_system.key))]
    pub fn sort_by_time_system(&mut self, time_system: &TimeSystem) -> TelemetryResult<usize> {
        let formatter = self
            .formats
            .get(&time_system.key)
            .ok_or_else(|| CollectionError::MissingFormatter(time_system.key.clone()))?;
        let options = SortOptions::asc(time_system.key.clone());

        let buffered = self.future.take_front(self.future.len());
        self.in_bounds.merge_sorted(buffered);
        self.in_bounds.resort(options.clone(), formatter.clone());
        self.future.resort(options, formatter.clone());

        let Bounds { start, end } = self.last_bounds;
        let tail = self.in_bounds.sorted_index(f64::NAN);
        let after = self.in_bounds.sorted_last_index(end);
        self.future
            .merge_sorted(self.in_bounds.take_range(after..tail));
        let dropped = self
            .in_bounds
            .take_front(self.in_bounds.sorted_index(start))
            .len();

        self.in_bounds.notify_sorted();
        self.formatter = Some(formatter);
        tracing::debug!(
            visible = self.in_bounds.len(),
            future = self.future.len(),
            dropped,
            "Buffers re-split"
        );
        Ok(dropped)
    }

    // ============================================================================================
    // Insertion
    // ============================================================================================

    /// Classifies and stores one row.
    ///
    /// - key before the window start: dropped silently
    /// - key after the window end: buffered in `future`
    /// - otherwise: inserted into `in_bounds`, emitting `Added`
    pub fn add_one(&mut self, row: TelemetryRow<D>) -> TelemetryResult<Placement> {
        self.apply_pending_bounds()?;
        let placement = match self.classify(&row)? {
            Class::Before => Placement::Discarded,
            Class::After => Placement::Future(self.future.add_one(row)),
            Class::Within => Placement::InBounds(self.in_bounds.add_one(row)),
        };
        tracing::trace!(?placement, "Row classified");
        Ok(placement)
    }

    /// Classifies a batch; visible rows are announced in one `Added`.
    pub fn add_many<I>(&mut self, rows: I) -> TelemetryResult<AddOutcome>
    where
        I: IntoIterator<Item = TelemetryRow<D>>,
    {
        self.apply_pending_bounds()?;
        let mut visible = Vec::new();
        let mut ahead = Vec::new();
        let mut discarded = 0;
        for row in rows {
            match self.classify(&row)? {
                Class::Before => discarded += 1,
                Class::After => ahead.push(row),
                Class::Within => visible.push(row),
            }
        }

        let outcome = AddOutcome {
            in_bounds: self.in_bounds.add_many(visible),
            future: self.future.add_many(ahead),
            discarded,
        };
        tracing::debug!(?outcome, "Batch classified");
        Ok(outcome)
    }

    fn classify(&self, row: &TelemetryRow<D>) -> TelemetryResult<Class> {
        let formatter = self.formatter.as_ref().ok_or(CollectionError::Unsorted)?;
        Ok(match formatter.parse_key(row.datum()) {
            Some(t) if t < self.last_bounds.start => Class::Before,
            Some(t) if t > self.last_bounds.end => Class::After,
            _ => Class::Within,
        })
    }

    // ============================================================================================
    // Bounds Protocol
    // ============================================================================================

    /// Moves the window forward to `bounds`.
    ///
    /// 1. If the start advanced, visible rows keyed below it are spliced off
    ///    the front and announced in one `Removed`.
    /// 2. If the end advanced, buffered rows keyed up to it are spliced off
    ///    the future buffer and appended to the visible rows in one `Added`.
    ///    Buffered rows that the start has already passed are dropped without
    ///    ever becoming visible.
    /// 3. `bounds` becomes the last seen window, even when nothing moved.
    ///
    /// Repeating the same bounds is a no-op.
    #[tracing::instrument(skip(self), fields(bounds = %bounds))]
    pub fn bounds(&mut self, bounds: Bounds) -> TelemetryResult<BoundsOutcome> {
        bounds.validate()?;
        let last = self.last_bounds;
        if !last.is_advanced_by(&bounds) {
            tracing::warn!(last = %last, "Bounds moved backwards");
            return Err(CollectionError::BoundsRegression {
                last_start: last.start,
                last_end: last.end,
                new_start: bounds.start,
                new_end: bounds.end,
            }
            .into());
        }

        let mut outcome = BoundsOutcome::default();

        if bounds.start > last.start {
            let first_kept = self.in_bounds.sorted_index(bounds.start);
            outcome.discarded = self.in_bounds.discard_front(first_kept).len();
        }

        if bounds.end > last.end {
            let last_promoted = self.future.sorted_last_index(bounds.end);
            let mut run = self.future.take_front(last_promoted);
            let first_kept = run.partition_point(|e| e.key().is_some_and(|t| t < bounds.start));
            outcome.skipped = run.drain(..first_kept).count();
            outcome.promoted = self.in_bounds.promote(run);
        }

        self.last_bounds = bounds;
        if !outcome.is_noop() {
            tracing::debug!(?outcome, "Window moved");
        }
        Ok(outcome)
    }

    /// Applies the latest bounds published by the attached context, if any
    /// arrived since the last call.
    pub fn apply_pending_bounds(&mut self) -> TelemetryResult<Option<BoundsOutcome>> {
        let pending = match self.bounds_rx.as_mut() {
            Some(rx) => match rx.has_changed() {
                Ok(true) => Some(*rx.borrow_and_update()),
                Ok(false) => None,
                Err(_) => {
                    tracing::debug!("Time context dropped, detaching from bounds");
                    self.bounds_rx = None;
                    None
                }
            },
            None => None,
        };
        pending.map(|b| self.bounds(b)).transpose()
    }

    // ============================================================================================
    // Removal
    // ============================================================================================

    /// Drops every row and restarts the window at `bounds`.
    ///
    /// This is the recovery path for a bounds regression or a time-system
    /// switch. Visible rows are announced in one `Removed`; pending bounds
    /// notifications are marked as seen.
    pub fn reset(&mut self, bounds: Bounds) -> TelemetryResult<Vec<TelemetryRow<D>>> {
        bounds.validate()?;
        if let Some(rx) = self.bounds_rx.as_mut() {
            rx.mark_unchanged();
        }
        self.future.clear();
        let removed = self.in_bounds.clear();
        self.last_bounds = bounds;
        tracing::debug!(bounds = %bounds, removed = removed.len(), "Collection reset");
        Ok(removed)
    }

    /// Drops every row, keeping the current window.
    pub fn clear(&mut self) -> Vec<TelemetryRow<D>> {
        self.future.clear();
        self.in_bounds.clear()
    }

    /// Drops every row produced by `entity` from both buffers.
    ///
    /// Returns the number of visible rows removed.
    pub fn remove_rows_for_entity(&mut self, entity: &EntityKey) -> usize {
        self.future.remove_where(|r| r.entity() == entity);
        self.in_bounds.remove_where(|r| r.entity() == entity).len()
    }

    // ============================================================================================
    // Lifecycle
    // ============================================================================================

    /// Attaches to `ctx` bounds notifications. The context's current bounds
    /// count as already seen.
    pub fn subscribe_to_bounds(&mut self, ctx: &TimeContext) {
        self.bounds_rx = Some(ctx.watch_bounds());
    }

    pub fn unsubscribe_from_bounds(&mut self) {
        self.bounds_rx = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.bounds_rx.is_some()
    }

    /// Detaches from bounds notifications. Rows are kept.
    pub fn destroy(&mut self) {
        self.unsubscribe_from_bounds();
    }
}

enum Class {
    Before,
    Within,
    After,
}
