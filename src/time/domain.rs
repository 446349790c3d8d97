// ================================================================================================
// Time Domain Types
// ================================================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TelemetryResult, TimeError};

/// The active time window `[start, end]`, expressed in the numeric domain of
/// the active time system (typically epoch milliseconds).
///
/// Both ends are inclusive. A record whose key equals `start` or `end` is
/// inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub start: f64,
    pub end: f64,
}

impl Bounds {
    /// Creates validated bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidBounds`] if either end is not finite or if
    /// `start > end`.
    pub fn new(start: f64, end: f64) -> TelemetryResult<Self> {
        let bounds = Self { start, end };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(TimeError::InvalidBounds {
                start: self.start,
                end: self.end,
                msg: "bounds must be finite".to_string(),
            }
            .into());
        }
        if self.start > self.end {
            return Err(TimeError::InvalidBounds {
                start: self.start,
                end: self.end,
                msg: "start must not exceed end".to_string(),
            }
            .into());
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.start <= value && value <= self.end
    }

    /// Returns `true` if neither end of `next` lies before the matching end of `self`.
    #[inline]
    pub fn is_advanced_by(&self, next: &Bounds) -> bool {
        next.start >= self.start && next.end >= self.end
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A named interpretation of the time domain (e.g. UTC, mission elapsed time).
///
/// `key` doubles as the telemetry value key used to sort rows and to parse a
/// datum's time, `time_format` names the formatter for that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSystem {
    pub key: String,
    pub name: String,
    pub time_format: String,
    #[serde(default)]
    pub is_utc_based: bool,
}

impl TimeSystem {
    pub fn new(key: impl Into<String>, time_format: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            time_format: time_format.into(),
            is_utc_based: false,
        }
    }

    /// The UTC time system, keyed on the `utc` telemetry value.
    pub fn utc() -> Self {
        Self {
            key: "utc".to_string(),
            name: "UTC".to_string(),
            time_format: "utc".to_string(),
            is_utc_based: true,
        }
    }
}

/// Offsets, in milliseconds, applied to a clock tick to derive the bounds.
///
/// A typical live window is `{ start: -900_000, end: 0 }`: the last fifteen
/// minutes up to the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockOffsets {
    pub start: i64,
    pub end: i64,
}

impl ClockOffsets {
    pub fn new(start: i64, end: i64) -> TelemetryResult<Self> {
        let offsets = Self { start, end };
        offsets.validate()?;
        Ok(offsets)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.start > self.end {
            return Err(TimeError::InvalidClockOffsets {
                start: self.start,
                end: self.end,
            }
            .into());
        }
        Ok(())
    }

    pub fn bounds_at(&self, tick: f64) -> Bounds {
        Bounds {
            start: tick + self.start as f64,
            end: tick + self.end as f64,
        }
    }
}

impl Default for ClockOffsets {
    fn default() -> Self {
        Self {
            start: -15 * 60 * 1000,
            end: 0,
        }
    }
}

/// A source of ticking time. Its presence puts the context in live mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    pub key: String,
    #[serde(default)]
    pub offsets: ClockOffsets,
}

impl Clock {
    pub fn new(key: impl Into<String>, offsets: ClockOffsets) -> Self {
        Self {
            key: key.into(),
            offsets,
        }
    }

    /// The wall clock, ticking in UTC milliseconds.
    pub fn local() -> Self {
        Self::new("local", ClockOffsets::default())
    }
}
