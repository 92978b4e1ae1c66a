use serde::{Deserialize, Serialize};

use super::SignalValue;

/// Latest known value for one signal path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Dotted VSS path, e.g. `Vehicle.Speed`.
    pub path: String,
    pub value: SignalValue,
    /// Timestamp of the datapoint (ISO 8601 format).
    pub timestamp: String,
}

impl SignalRecord {
    /// Builds a record from wire parts.
    ///
    /// A missing timestamp is replaced by the current UTC time.
    pub fn from_wire(
        path: impl Into<String>,
        value: Option<&serde_json::Value>,
        timestamp: Option<&str>,
    ) -> Self {
        let timestamp = match timestamp {
            Some(ts) if !ts.is_empty() => ts.to_string(),
            _ => chrono::Utc::now().to_rfc3339(),
        };
        Self {
            path: path.into(),
            value: SignalValue::decode_json(value),
            timestamp,
        }
    }
}
