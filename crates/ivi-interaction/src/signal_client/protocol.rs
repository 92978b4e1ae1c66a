//! VISS-style JSON frames exchanged with the signal server.

use ivi_core::signal::{SignalRecord, SignalValue};
use serde::{Deserialize, Serialize};

/// Outbound request frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub action: Action,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Get,
    Set,
    Subscribe,
    Unsubscribe,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Set => "set",
            Action::Subscribe => "subscribe",
            Action::Unsubscribe => "unsubscribe",
        }
    }
}

impl Request {
    fn new(action: Action, request_id: String) -> Self {
        Self {
            action,
            request_id,
            path: None,
            value: None,
            subscription_id: None,
        }
    }

    pub fn get(request_id: String, path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::new(Action::Get, request_id)
        }
    }

    pub fn set(request_id: String, path: &str, value: &SignalValue) -> Self {
        Self {
            path: Some(path.to_string()),
            value: Some(value.encode()),
            ..Self::new(Action::Set, request_id)
        }
    }

    pub fn subscribe(request_id: String, path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::new(Action::Subscribe, request_id)
        }
    }

    pub fn unsubscribe(request_id: String, subscription_id: &str) -> Self {
        Self {
            subscription_id: Some(subscription_id.to_string()),
            ..Self::new(Action::Unsubscribe, request_id)
        }
    }

    pub fn to_frame(&self) -> String {
        // Serializing plain strings and enums cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Inbound frame. Every field is optional; the shape decides how it is dispatched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub number: Option<serde_json::Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn code(&self) -> String {
        match &self.number {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        }
    }

    /// "code + reason + detail" rendering used for the error callback.
    pub fn describe(&self) -> String {
        format!(
            "Signal server error {}: {} - {}",
            self.code(),
            self.reason.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or("no detail"),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DataEntry {
    path: String,
    #[serde(default)]
    dp: Option<Datapoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Datapoint {
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    ts: Option<String>,
}

impl Frame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn is_action(&self, action: &str) -> bool {
        self.action.as_deref() == Some(action)
    }

    /// Decodes `data` into signal records. A `get` on a branch may answer
    /// with an array of entries.
    pub fn records(&self) -> Vec<SignalRecord> {
        let Some(data) = &self.data else {
            return Vec::new();
        };
        let entries: Vec<DataEntry> = match data {
            serde_json::Value::Array(_) => serde_json::from_value(data.clone()).unwrap_or_default(),
            _ => serde_json::from_value(data.clone())
                .map(|entry| vec![entry])
                .unwrap_or_default(),
        };
        entries
            .into_iter()
            .map(|entry| {
                let dp = entry.dp.unwrap_or_default();
                SignalRecord::from_wire(entry.path, dp.value.as_ref(), dp.ts.as_deref())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frames() {
        let frame: serde_json::Value =
            serde_json::from_str(&Request::subscribe("r1".into(), "Vehicle.Speed").to_frame())
                .unwrap();
        assert_eq!(
            frame,
            json!({"action": "subscribe", "requestId": "r1", "path": "Vehicle.Speed"})
        );

        let frame: serde_json::Value = serde_json::from_str(
            &Request::set(
                "r2".into(),
                "Vehicle.Cabin.HVAC.Station.Row1.Driver.Temperature",
                &SignalValue::Number(21.0),
            )
            .to_frame(),
        )
        .unwrap();
        assert_eq!(frame["value"], json!("21"));
        assert_eq!(frame["action"], json!("set"));

        let frame: serde_json::Value =
            serde_json::from_str(&Request::unsubscribe("r3".into(), "sub-7").to_frame()).unwrap();
        assert_eq!(
            frame,
            json!({"action": "unsubscribe", "requestId": "r3", "subscriptionId": "sub-7"})
        );
    }

    #[test]
    fn test_parse_subscription_push() {
        let frame = Frame::parse(
            r#"{"action":"subscription","subscriptionId":"s1","data":{"path":"Vehicle.Speed","dp":{"value":"95","ts":"2025-01-01T00:00:00Z"}}}"#,
        )
        .unwrap();
        assert!(frame.is_action("subscription"));
        let records = frame.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, SignalValue::Number(95.0));
        assert_eq!(records[0].timestamp, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn test_parse_array_data() {
        let frame = Frame::parse(
            r#"{"action":"get","requestId":"r1","data":[{"path":"A","dp":{"value":"1"}},{"path":"B","dp":{"value":"x"}}]}"#,
        )
        .unwrap();
        let records = frame.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value, SignalValue::Text("x".into()));
    }

    #[test]
    fn test_error_description() {
        let frame = Frame::parse(
            r#"{"action":"get","requestId":"r1","error":{"number":404,"reason":"invalid_path","message":"The specified data path does not exist."}}"#,
        )
        .unwrap();
        let error = frame.error.unwrap();
        assert_eq!(error.code(), "404");
        assert_eq!(
            error.describe(),
            "Signal server error 404: invalid_path - The specified data path does not exist."
        );
    }
}
