use serde::{Deserialize, Serialize};

use crate::{
    error::TelemetryResult,
    impl_newtype_conversions,
    telemetry::{EntityKey, FormatMap, RequestOptions, SharedFormatter},
    time::{Clock, TimeContext, TimeSystem},
};

// ================================================================================================
// State
// ================================================================================================

/// What the reconciler knows about the latest value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LatestDatum<D> {
    /// The historical request for the active time system has not resolved.
    #[default]
    Unresolved,
    /// The historical request resolved empty or failed.
    NoData,
    /// The last datum accepted as latest.
    Datum(D),
}

impl<D> LatestDatum<D> {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    pub fn datum(&self) -> Option<&D> {
        match self {
            Self::Datum(d) => Some(d),
            _ => None,
        }
    }
}

/// Generation of the historical request. Every time-system change bumps it;
/// responses carrying an older token are stale.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RequestToken(pub u64);

impl_newtype_conversions!(RequestToken, u64);

impl RequestToken {
    #[inline]
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A historical request the caller must issue and hand back to
/// [`LatestValueReconciler::resolve_historical`] together with its token.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRequest {
    pub token: RequestToken,
    pub options: RequestOptions,
}

/// What happened to a datum offered to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Passed to the consumer.
    Delivered,
    /// Accepted as latest but outside the fixed-mode bounds.
    Filtered,
    /// Held until the historical request resolves.
    Stashed,
    /// Not later than the latest value, stale, or the reconciler is inactive.
    Dropped,
}

// ================================================================================================
// Reconciler
// ================================================================================================

/// Single latest value for one entity, merged from a historical "latest"
/// request and a realtime feed.
///
/// The reconciler is a synchronous state machine. It never performs I/O: it
/// hands out [`HistoricalRequest`]s and is fed their responses and the
/// realtime pushes by a driver (see
/// [`LatestValueSubscription`](crate::latest::LatestValueSubscription)).
///
/// # Ordering Guarantees
///
/// - The consumer never sees time go backwards: a datum is delivered only if
///   it is strictly later than the previous latest value.
/// - A response to a request superseded by a time-system change is never
///   delivered.
/// - Realtime data received before the historical response is held back and
///   replayed after it, keeping only the later of the pending values.
///
/// A datum whose time cannot be parsed is never later than anything; with no
/// formatter for the time system only the historical value and the first
/// push after an empty history get through.
pub struct LatestValueReconciler<D, C> {
    entity: EntityKey,
    ctx: TimeContext,
    formats: FormatMap<D>,
    formatter: Option<SharedFormatter<D>>,
    latest: LatestDatum<D>,
    pending: Option<D>,
    token: RequestToken,
    restrict_to_bounds: bool,
    active: bool,
    callback: C,
}

impl<D, C> LatestValueReconciler<D, C>
where
    D: Clone,
    C: FnMut(D),
{
    /// Creates an active reconciler in the context's current clock mode.
    ///
    /// Nothing is requested yet; call
    /// [`update_time_system`](Self::update_time_system) to start.
    pub fn new(entity: EntityKey, formats: FormatMap<D>, ctx: TimeContext, callback: C) -> Self {
        let restrict_to_bounds = !ctx.is_realtime();
        Self {
            entity,
            ctx,
            formats,
            formatter: None,
            latest: LatestDatum::Unresolved,
            pending: None,
            token: RequestToken::default(),
            restrict_to_bounds,
            active: true,
            callback,
        }
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    pub fn latest(&self) -> &LatestDatum<D> {
        &self.latest
    }

    pub fn pending(&self) -> Option<&D> {
        self.pending.as_ref()
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn restricts_to_bounds(&self) -> bool {
        self.restrict_to_bounds
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // ============================================================================================
    // Time System
    // ============================================================================================

    /// Forgets everything known under the previous time system and returns
    /// the "latest" request to issue under the new one.
    ///
    /// Any request still in flight is superseded. Returns `None` once
    /// unsubscribed.
    #[tracing::instrument(skip(self, time_system), fields(entity = %self.entity, key = %time_system.key))]
    pub fn update_time_system(&mut self, time_system: &TimeSystem) -> Option<HistoricalRequest> {
        if !self.active {
            return None;
        }

        self.latest = LatestDatum::Unresolved;
        self.pending = None;
        self.formatter = self.formats.get(&time_system.key);
        if self.formatter.is_none() {
            tracing::warn!("No formatter for time system, latest values are not comparable");
        }

        self.token = self.token.next();
        let options = RequestOptions::latest()
            .with_bounds(self.ctx.bounds())
            .with_domain(time_system.key.clone());
        tracing::debug!(token = %self.token, "Requesting latest available data");
        Some(HistoricalRequest {
            token: self.token,
            options,
        })
    }

    /// Applies the outcome of a historical request.
    ///
    /// The last element of a successful response is the latest value; an
    /// empty response or an error resolves to [`LatestDatum::NoData`]. A
    /// pending realtime datum is then replayed through
    /// [`callback_if_latest`](Self::callback_if_latest).
    pub fn resolve_historical(
        &mut self,
        token: RequestToken,
        result: TelemetryResult<Vec<D>>,
    ) -> Delivery {
        if !self.active {
            return Delivery::Dropped;
        }
        if token != self.token {
            tracing::debug!(
                entity = %self.entity,
                stale = %token,
                current = %self.token,
                "Discarding superseded historical response"
            );
            return Delivery::Dropped;
        }

        let latest = match result {
            Ok(mut data) => data.pop(),
            Err(e) => {
                tracing::warn!(entity = %self.entity, error = %e, "Historical request failed, treating as no data");
                None
            }
        };

        let delivery = match latest {
            Some(datum) => {
                self.latest = LatestDatum::Datum(datum.clone());
                self.apply_bounds_filter(datum)
            }
            None => {
                self.latest = LatestDatum::NoData;
                Delivery::Dropped
            }
        };

        match self.pending.take() {
            Some(pending) => match self.callback_if_latest(pending) {
                Delivery::Dropped => delivery,
                replayed => replayed,
            },
            None => delivery,
        }
    }

    // ============================================================================================
    // Realtime
    // ============================================================================================

    /// Offers a realtime datum.
    ///
    /// - inactive: dropped
    /// - history unresolved: stashed, unless an already stashed datum is later
    /// - otherwise: accepted and filtered if strictly later than the latest
    ///   value (or there is no history), else dropped
    pub fn callback_if_latest(&mut self, datum: D) -> Delivery {
        if !self.active {
            return Delivery::Dropped;
        }

        match &self.latest {
            LatestDatum::Unresolved => {
                let replace = match &self.pending {
                    Some(pending) => self.is_later(&datum, pending),
                    None => true,
                };
                if replace {
                    self.pending = Some(datum);
                    Delivery::Stashed
                } else {
                    Delivery::Dropped
                }
            }
            LatestDatum::NoData => self.accept(datum),
            LatestDatum::Datum(latest) => {
                if self.is_later(&datum, latest) {
                    self.accept(datum)
                } else {
                    tracing::trace!(entity = %self.entity, "Dropping datum not later than latest");
                    Delivery::Dropped
                }
            }
        }
    }

    fn accept(&mut self, datum: D) -> Delivery {
        self.latest = LatestDatum::Datum(datum.clone());
        self.apply_bounds_filter(datum)
    }

    /// `a` is later than `b`. An unparseable `a` never is; any parseable `a`
    /// is later than an unparseable `b`.
    fn is_later(&self, a: &D, b: &D) -> bool {
        let Some(formatter) = self.formatter.as_ref() else {
            return false;
        };
        match (formatter.parse_key(a), formatter.parse_key(b)) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    // ============================================================================================
    // Bounds Filter
    // ============================================================================================

    /// Hands `datum` to the consumer unless the context is in fixed mode and
    /// the datum lies outside the current bounds.
    pub fn apply_bounds_filter(&mut self, datum: D) -> Delivery {
        let visible = match (&self.formatter, self.restrict_to_bounds) {
            (Some(formatter), true) => formatter
                .parse_key(&datum)
                .is_some_and(|t| self.ctx.bounds().contains(t)),
            _ => true,
        };

        if visible {
            (self.callback)(datum);
            Delivery::Delivered
        } else {
            tracing::trace!(entity = %self.entity, "Latest value outside bounds");
            Delivery::Filtered
        }
    }

    /// Live mode (a clock is running) delivers regardless of bounds.
    pub fn update_clock(&mut self, clock: Option<&Clock>) {
        self.restrict_to_bounds = clock.is_none();
        tracing::debug!(
            entity = %self.entity,
            restrict_to_bounds = self.restrict_to_bounds,
            "Clock mode changed"
        );
    }

    // ============================================================================================
    // Teardown
    // ============================================================================================

    /// Stops all delivery. Responses and pushes arriving later are dropped.
    pub fn unsubscribe(&mut self) {
        if self.active {
            self.active = false;
            self.pending = None;
            tracing::debug!(entity = %self.entity, "Latest value reconciler unsubscribed");
        }
    }
}

impl<D: std::fmt::Debug, C> std::fmt::Debug for LatestValueReconciler<D, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestValueReconciler")
            .field("entity", &self.entity)
            .field("latest", &self.latest)
            .field("pending", &self.pending)
            .field("token", &self.token)
            .field("restrict_to_bounds", &self.restrict_to_bounds)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
