use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Display hints attached to a telemetry value.
///
/// Lower numbers rank first. A value with a `domain` hint is a candidate
/// time axis; a value with a `range` hint is a measured quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueHints {
    #[serde(default)]
    pub domain: Option<u32>,
    #[serde(default)]
    pub range: Option<u32>,
}

/// Describes one value key produced by an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMetadata {
    pub key: String,
    #[serde(default)]
    pub name: String,
    /// Formatter name, e.g. `utc` or `number`.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub hints: ValueHints,
}

impl ValueMetadata {
    pub fn domain(key: impl Into<String>, format: impl Into<String>, rank: u32) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            format: Some(format.into()),
            hints: ValueHints {
                domain: Some(rank),
                range: None,
            },
        }
    }

    pub fn range(key: impl Into<String>, rank: u32) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            format: Some("number".to_string()),
            hints: ValueHints {
                domain: None,
                range: Some(rank),
            },
        }
    }
}

/// The set of values an entity produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMetadata {
    pub values: Vec<ValueMetadata>,
}

impl TelemetryMetadata {
    pub fn new(values: Vec<ValueMetadata>) -> Self {
        Self { values }
    }

    pub fn value(&self, key: &str) -> Option<&ValueMetadata> {
        self.values.iter().find(|v| v.key == key)
    }

    /// Values carrying a `domain` hint, ordered by hint rank.
    pub fn domains(&self) -> Vec<&ValueMetadata> {
        self.values
            .iter()
            .filter_map(|v| v.hints.domain.map(|rank| (rank, v)))
            .sorted_by_key(|(rank, _)| *rank)
            .map(|(_, v)| v)
            .collect()
    }

    /// Values carrying a `range` hint, ordered by hint rank.
    pub fn ranges(&self) -> Vec<&ValueMetadata> {
        self.values
            .iter()
            .filter_map(|v| v.hints.range.map(|rank| (rank, v)))
            .sorted_by_key(|(rank, _)| *rank)
            .map(|(_, v)| v)
            .collect()
    }
}
