use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::PulseError;

/// Measurement name every pull request record is emitted under.
pub const MEASUREMENT: &str = "bitbucket";

/// A single measurement value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Measurement fields, kept in insertion order.
pub type Fields = IndexMap<String, FieldValue>;

/// Categorical tags, kept in insertion order.
pub type Tags = IndexMap<String, String>;

/// Write-only destination for gathered metrics.
///
/// Records are pushed one at a time once a gather cycle has fetched
/// everything; errors are pushed as they are encountered and never abort
/// the sink.
pub trait MetricSink {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    );

    fn add_error(&mut self, error: &PulseError);
}

/// One emitted record.
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub fields: Fields,
    pub tags: Tags,
    pub timestamp: DateTime<Utc>,
}
