use serde::{Deserialize, Serialize};

/// Typed events carried by the agent's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The agent started a tool call.
    ToolCall {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    /// A tool call finished. Failed tools report a JSON object with an `error` key.
    ToolResult {
        name: String,
        #[serde(default)]
        result: Option<String>,
    },
    /// A fragment of assistant text.
    TextChunk {
        #[serde(default)]
        content: String,
    },
    /// The turn failed. Terminal.
    Error {
        #[serde(default)]
        message: String,
    },
    /// The turn finished. Terminal.
    Done,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. } | StreamEvent::Done)
    }
}

/// Whether a tool result payload reports a tool failure.
pub fn is_error_result(result: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(result)
        .ok()
        .and_then(|value| value.as_object().map(|object| object.contains_key("error")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_kind() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"tool_call","name":"get_signal","args":{"path":"Vehicle.Speed"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::ToolCall {
                name: "get_signal".to_string(),
                args: serde_json::json!({"path": "Vehicle.Speed"}),
            }
        );

        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"tool_result","name":"get_signal","result":"95"}"#)
                .unwrap();
        assert!(matches!(event, StreamEvent::ToolResult { ref result, .. } if result.as_deref() == Some("95")));

        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"text_chunk","content":"Hi"}"#).unwrap();
        assert_eq!(event, StreamEvent::TextChunk { content: "Hi".to_string() });

        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"error","message":"quota"}"#).unwrap();
        assert!(event.is_terminal());

        let event: StreamEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(event, StreamEvent::Done);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"thinking"}"#).is_err());
    }

    #[test]
    fn test_is_error_result() {
        assert!(is_error_result(r#"{"error": "Databroker unreachable"}"#));
        assert!(!is_error_result(r#"{"value": 95}"#));
        assert!(!is_error_result("plain text result"));
        assert!(!is_error_result("[\"error\"]"));
    }
}
