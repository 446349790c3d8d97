use std::fmt;

use serde::{Deserialize, Serialize};

pub mod format;
pub mod metadata;
pub mod provider;

pub use format::{FormatMap, JsonFormatKind, JsonFormatter, SharedFormatter, ValueFormatter};
pub use metadata::{TelemetryMetadata, ValueHints, ValueMetadata};
pub use provider::{RequestOptions, RequestStrategy, Subscription, TelemetryProvider};

/// Identifies a telemetry-producing entity (a domain object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(pub String);

impl EntityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
