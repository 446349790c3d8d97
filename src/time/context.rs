use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    config::TimeConductorConfig,
    error::TelemetryResult,
    time::domain::{Bounds, Clock, TimeSystem},
};

/// View-scoped time state: active bounds, time system and clock.
///
/// Each of the three values lives in its own `watch` channel. Listeners call
/// one of the `watch_*` methods and detach by dropping the receiver, so there
/// is no ambient registry and no listener bookkeeping on this side.
///
/// Cloning is cheap; all clones publish to the same channels.
///
/// # Examples
///
/// ```rust
/// # use telemetry_table::time::{Bounds, TimeContext, TimeSystem};
/// let ctx = TimeContext::new(TimeSystem::utc(), Bounds::new(0.0, 10.0).unwrap());
/// let mut bounds = ctx.watch_bounds();
///
/// ctx.set_bounds(Bounds::new(5.0, 15.0).unwrap()).unwrap();
/// assert!(bounds.has_changed().unwrap());
/// assert_eq!(bounds.borrow_and_update().start, 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct TimeContext {
    inner: Arc<Channels>,
}

#[derive(Debug)]
struct Channels {
    bounds: watch::Sender<Bounds>,
    time_system: watch::Sender<TimeSystem>,
    clock: watch::Sender<Option<Clock>>,
}

impl TimeContext {
    /// Creates a context in fixed mode (no clock).
    pub fn new(time_system: TimeSystem, bounds: Bounds) -> Self {
        let (bounds, _) = watch::channel(bounds);
        let (time_system, _) = watch::channel(time_system);
        let (clock, _) = watch::channel(None);
        Self {
            inner: Arc::new(Channels {
                bounds,
                time_system,
                clock,
            }),
        }
    }

    pub fn from_config(cfg: &TimeConductorConfig) -> TelemetryResult<Self> {
        cfg.validate()?;
        let ctx = Self::new(cfg.time_system.clone(), cfg.bounds);
        if let Some(clock) = &cfg.clock {
            ctx.set_clock(Some(clock.clone()))?;
        }
        Ok(ctx)
    }

    // ============================================================================================
    // Accessors
    // ============================================================================================

    pub fn bounds(&self) -> Bounds {
        *self.inner.bounds.borrow()
    }

    pub fn time_system(&self) -> TimeSystem {
        self.inner.time_system.borrow().clone()
    }

    pub fn clock(&self) -> Option<Clock> {
        self.inner.clock.borrow().clone()
    }

    /// Returns `true` while a clock is active.
    pub fn is_realtime(&self) -> bool {
        self.inner.clock.borrow().is_some()
    }

    // ============================================================================================
    // Mutators
    // ============================================================================================

    #[tracing::instrument(skip(self), fields(bounds = %bounds))]
    pub fn set_bounds(&self, bounds: Bounds) -> TelemetryResult<()> {
        bounds.validate()?;
        self.inner.bounds.send_replace(bounds);
        Ok(())
    }

    /// Switches the time system and publishes the bounds expressed in it.
    ///
    /// The time system is published before the bounds, so listeners that react
    /// to both observe the new system first.
    #[tracing::instrument(skip(self, time_system), fields(key = %time_system.key, bounds = %bounds))]
    pub fn set_time_system(&self, time_system: TimeSystem, bounds: Bounds) -> TelemetryResult<()> {
        bounds.validate()?;
        self.inner.time_system.send_replace(time_system);
        self.inner.bounds.send_replace(bounds);
        Ok(())
    }

    /// Starts (`Some`) or stops (`None`) the ticking clock.
    pub fn set_clock(&self, clock: Option<Clock>) -> TelemetryResult<()> {
        if let Some(clock) = &clock {
            clock.offsets.validate()?;
        }
        tracing::debug!(clock = ?clock.as_ref().map(|c| c.key.as_str()), "Clock changed");
        self.inner.clock.send_replace(clock);
        Ok(())
    }

    /// Advances the live window to `timestamp`.
    ///
    /// Returns the published bounds, or `None` in fixed mode where ticks are
    /// ignored.
    pub fn tick(&self, timestamp: f64) -> TelemetryResult<Option<Bounds>> {
        let Some(offsets) = self.inner.clock.borrow().as_ref().map(|c| c.offsets) else {
            return Ok(None);
        };
        let bounds = offsets.bounds_at(timestamp);
        bounds.validate()?;
        tracing::trace!(timestamp, bounds = %bounds, "Clock tick");
        self.inner.bounds.send_replace(bounds);
        Ok(Some(bounds))
    }

    // ============================================================================================
    // Change notifications
    // ============================================================================================

    /// Receiver for bounds changes. The current value is marked as seen.
    pub fn watch_bounds(&self) -> watch::Receiver<Bounds> {
        self.inner.bounds.subscribe()
    }

    pub fn watch_time_system(&self) -> watch::Receiver<TimeSystem> {
        self.inner.time_system.subscribe()
    }

    pub fn watch_clock(&self) -> watch::Receiver<Option<Clock>> {
        self.inner.clock.subscribe()
    }
}
