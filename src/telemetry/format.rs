use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

use crate::telemetry::metadata::TelemetryMetadata;

// ================================================================================================
// Traits
// ================================================================================================

/// Parses and formats one value key of a datum.
///
/// `parse` yields the numeric sort/time key. Returning `None` (or NaN) marks
/// the datum as unparseable for this key; callers degrade instead of failing.
pub trait ValueFormatter<D>: Send + Sync + Debug {
    /// The value key this formatter reads.
    fn key(&self) -> &str;

    fn parse(&self, datum: &D) -> Option<f64>;

    fn format(&self, datum: &D) -> String;

    /// `parse`, with NaN folded into `None`.
    fn parse_key(&self, datum: &D) -> Option<f64> {
        self.parse(datum).filter(|v| !v.is_nan())
    }
}

pub type SharedFormatter<D> = Arc<dyn ValueFormatter<D>>;

// ================================================================================================
// Format Map
// ================================================================================================

/// Value key to formatter lookup for one entity.
#[derive(Debug)]
pub struct FormatMap<D> {
    inner: HashMap<String, SharedFormatter<D>>,
}

impl<D> Clone for FormatMap<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D> Default for FormatMap<D> {
    fn default() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }
}

impl<D> FormatMap<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, formatter: SharedFormatter<D>) -> Option<SharedFormatter<D>> {
        self.inner.insert(formatter.key().to_string(), formatter)
    }

    pub fn get(&self, key: &str) -> Option<SharedFormatter<D>> {
        self.inner.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<D> FromIterator<SharedFormatter<D>> for FormatMap<D> {
    fn from_iter<I: IntoIterator<Item = SharedFormatter<D>>>(iter: I) -> Self {
        let mut map = Self::new();
        iter.into_iter().for_each(|f| {
            map.insert(f);
        });
        map
    }
}

// ================================================================================================
// JSON Datums
// ================================================================================================

/// How a JSON value is interpreted.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JsonFormatKind {
    /// Epoch milliseconds, or an RFC 3339 string.
    Utc,
    #[default]
    Number,
}

/// Formatter for `serde_json::Value` object datums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFormatter {
    key: String,
    kind: JsonFormatKind,
}

impl JsonFormatter {
    pub fn new(key: impl Into<String>, kind: JsonFormatKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }

    /// Builds one formatter per metadata value. Unknown format names fall back
    /// to [`JsonFormatKind::Number`].
    pub fn format_map(metadata: &TelemetryMetadata) -> FormatMap<Value> {
        metadata
            .values
            .iter()
            .map(|v| {
                let kind = v
                    .format
                    .as_deref()
                    .and_then(|f| f.parse().ok())
                    .unwrap_or_default();
                Arc::new(JsonFormatter::new(v.key.clone(), kind)) as SharedFormatter<Value>
            })
            .collect()
    }
}

impl ValueFormatter<Value> for JsonFormatter {
    fn key(&self) -> &str {
        &self.key
    }

    fn parse(&self, datum: &Value) -> Option<f64> {
        match (self.kind, datum.get(&self.key)?) {
            (_, Value::Number(n)) => n.as_f64(),
            (JsonFormatKind::Utc, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis() as f64),
            (JsonFormatKind::Number, Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn format(&self, datum: &Value) -> String {
        match (self.kind, self.parse_key(datum)) {
            (JsonFormatKind::Utc, Some(ms)) => DateTime::<Utc>::from_timestamp_millis(ms as i64)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_default(),
            (JsonFormatKind::Number, Some(n)) => n.to_string(),
            (_, None) => datum
                .get(&self.key)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::telemetry::metadata::ValueMetadata;

    #[test]
    fn utc_formatter_reads_millis_and_rfc3339() {
        let f = JsonFormatter::new("utc", JsonFormatKind::Utc);
        assert_eq!(f.parse(&json!({ "utc": 1_000 })), Some(1_000.0));
        assert_eq!(
            f.parse(&json!({ "utc": "1970-01-01T00:00:01.500Z" })),
            Some(1_500.0)
        );
        assert_eq!(f.format(&json!({ "utc": 1_500 })), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn unparseable_values_yield_none() {
        let f = JsonFormatter::new("utc", JsonFormatKind::Utc);
        assert_eq!(f.parse_key(&json!({ "utc": "yesterday" })), None);
        assert_eq!(f.parse_key(&json!({ "other": 1 })), None);
        assert_eq!(f.parse_key(&json!({ "utc": null })), None);
    }

    #[test]
    fn format_map_follows_metadata() {
        let metadata = TelemetryMetadata::new(vec![
            ValueMetadata::domain("utc", "utc", 0),
            ValueMetadata::range("value", 0),
            ValueMetadata {
                key: "raw".to_string(),
                name: "raw".to_string(),
                format: Some("enum".to_string()),
                hints: Default::default(),
            },
        ]);
        let map = JsonFormatter::format_map(&metadata);

        assert_eq!(map.len(), 3);
        let raw = map.get("raw").unwrap();
        assert_eq!(raw.parse(&json!({ "raw": "42" })), Some(42.0));
        assert!(map.get("missing").is_none());
    }
}
