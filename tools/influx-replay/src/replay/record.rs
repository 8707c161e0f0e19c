//! The structured log line replayed in place of a telemetry query result.
//!
//! Each line of a replay file is one JSON object. Besides the confusion-matrix
//! counters it must carry a string field naming the record's kind; the key of
//! that field is configurable (`replay.kind_field`, default `"kind"`). Lines
//! without it cannot be grouped and are rejected like any other malformed line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_KIND_FIELD: &str = "kind";

/// One confusion-matrix data point, as logged by the QA job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Read from and written to the configured kind field, never by name.
    #[serde(skip)]
    pub kind: String,
    pub level: String,
    /// Kept as logged, e.g. `2022-10-31T16:10:41.384Z`.
    pub timestamp: String,
    pub message: String,
    #[serde(rename = "SumTruePositive")]
    pub sum_true_positive: f64,
    #[serde(rename = "SumFalsePositive")]
    pub sum_false_positive: f64,
    #[serde(rename = "SumTrueNegative")]
    pub sum_true_negative: f64,
    #[serde(rename = "SumFalseNegative")]
    pub sum_false_negative: f64,
    #[serde(rename = "NumMinutes")]
    pub num_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("line is not a json object")]
    NotAnObject,
    #[error("missing string field {0:?}")]
    MissingKind(String),
    #[error("schema mismatch: {0}")]
    Schema(String),
}

impl Record {
    /// Parse one replay line, taking the kind from `kind_field`.
    pub fn parse_line(line: &str, kind_field: &str) -> Result<Self, ParseFailure> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
        let kind = match &value {
            Value::Object(map) => map
                .get(kind_field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ParseFailure::MissingKind(kind_field.to_string()))?,
            _ => return Err(ParseFailure::NotAnObject),
        };
        let mut record: Record =
            serde_json::from_value(value).map_err(|e| ParseFailure::Schema(e.to_string()))?;
        record.kind = kind;
        Ok(record)
    }

    /// Render as one replay line, writing the kind under `kind_field` so the
    /// output parses back with the same setting.
    pub fn to_json_line(&self, kind_field: &str) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(kind_field.to_string(), Value::String(self.kind.clone()));
        }
        serde_json::to_string(&value)
    }
}
