// ================================================================================================
// Configuration
// ================================================================================================

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, TelemetryResult},
    telemetry::RequestOptions,
    time::{Bounds, Clock, ClockOffsets, TimeSystem},
};

/// Initial state of a [`TimeContext`](crate::time::TimeContext).
///
/// # Example
///
/// ```rust
/// # use telemetry_table::config::TimeConductorConfig;
/// let cfg = TimeConductorConfig::from_json(r#"{
///     "time_system": { "key": "utc", "name": "UTC", "time_format": "utc", "is_utc_based": true },
///     "bounds": { "start": 0.0, "end": 900000.0 },
///     "clock": { "key": "local", "offsets": { "start": -900000, "end": 0 } }
/// }"#).unwrap();
/// assert!(cfg.clock.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConductorConfig {
    pub time_system: TimeSystem,
    pub bounds: Bounds,
    #[serde(default)]
    pub clock: Option<Clock>,
}

impl Default for TimeConductorConfig {
    fn default() -> Self {
        let offsets = ClockOffsets::default();
        Self {
            time_system: TimeSystem::utc(),
            bounds: Bounds {
                start: offsets.start as f64,
                end: offsets.end as f64,
            },
            clock: None,
        }
    }
}

impl TimeConductorConfig {
    pub fn from_json(json: &str) -> TelemetryResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(ConfigError::from)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_time_system(self, time_system: TimeSystem) -> Self {
        Self {
            time_system,
            ..self
        }
    }

    pub fn with_bounds(self, bounds: Bounds) -> Self {
        Self { bounds, ..self }
    }

    pub fn with_clock(self, clock: Clock) -> Self {
        Self {
            clock: Some(clock),
            ..self
        }
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.time_system.key.is_empty() {
            return Err(ConfigError::Invalid("time system key must not be empty".to_string()).into());
        }
        self.bounds.validate()?;
        if let Some(clock) = &self.clock {
            clock.offsets.validate()?;
        }
        Ok(())
    }
}

/// Behaviour of a [`TelemetryTableFeed`](crate::table::TelemetryTableFeed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Clear and requery when the bounds move backwards instead of failing.
    #[serde(default = "default_true")]
    pub requery_on_regression: bool,

    /// Options of the historical request issued for the current bounds.
    /// `start`/`end` are filled in from the bounds at request time.
    #[serde(default)]
    pub historical: RequestOptions,
}

fn default_true() -> bool {
    true
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            requery_on_regression: true,
            historical: RequestOptions::default(),
        }
    }
}

impl TableConfig {
    pub fn from_json(json: &str) -> TelemetryResult<Self> {
        Ok(serde_json::from_str(json).map_err(ConfigError::from)?)
    }

    pub fn with_requery_on_regression(self, requery_on_regression: bool) -> Self {
        Self {
            requery_on_regression,
            ..self
        }
    }

    pub fn with_historical(self, historical: RequestOptions) -> Self {
        Self { historical, ..self }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::{TelemetryError, TimeError};

    #[test]
    fn conductor_config_rejects_inverted_bounds() {
        let json = r#"{
            "time_system": { "key": "utc", "name": "UTC", "time_format": "utc" },
            "bounds": { "start": 10.0, "end": 1.0 }
        }"#;
        let err = TimeConductorConfig::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Time(TimeError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn conductor_config_rejects_inverted_offsets() {
        let cfg = TimeConductorConfig::default()
            .with_clock(Clock::new("local", ClockOffsets { start: 10, end: 0 }));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn table_config_defaults_to_requery() {
        let cfg = TableConfig::from_json("{}").unwrap();
        assert!(cfg.requery_on_regression);
        assert_eq!(cfg.historical, RequestOptions::default());
    }
}
