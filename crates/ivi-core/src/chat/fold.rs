//! Folding stream events into the open assistant message.

use super::event::is_error_result;
use super::{ChatMessage, StreamEvent, ToolCallRecord, ToolCallStatus};

/// What the stream should do after an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldStep {
    /// Keep reading.
    Continue,
    /// The turn ended normally.
    Completed,
    /// The turn ended with an error message.
    Failed(String),
}

impl ChatMessage {
    /// Applies one stream event to this (assistant) message.
    pub fn apply_event(&mut self, event: StreamEvent) -> FoldStep {
        match event {
            StreamEvent::ToolCall { name, args } => {
                let args = if args.is_null() {
                    serde_json::Value::Object(Default::default())
                } else {
                    args
                };
                self.tool_calls.push(ToolCallRecord::calling(name, args));
                FoldStep::Continue
            }
            StreamEvent::ToolResult { name, result } => {
                // Most recent unmatched call with this name.
                let open = self
                    .tool_calls
                    .iter_mut()
                    .rev()
                    .find(|call| call.name == name && call.status == ToolCallStatus::Calling);
                match open {
                    Some(call) => {
                        let result = result.unwrap_or_default();
                        call.status = if is_error_result(&result) {
                            ToolCallStatus::Error
                        } else {
                            ToolCallStatus::Done
                        };
                        call.result = Some(result);
                    }
                    None => {
                        tracing::debug!(tool = %name, "tool_result without a pending call, ignoring");
                    }
                }
                FoldStep::Continue
            }
            StreamEvent::TextChunk { content } => {
                self.content.push_str(&content);
                FoldStep::Continue
            }
            StreamEvent::Error { message } => FoldStep::Failed(message),
            StreamEvent::Done => FoldStep::Completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_call(name: &str) -> StreamEvent {
        StreamEvent::ToolCall {
            name: name.to_string(),
            args: json!({"path": "Vehicle.Speed"}),
        }
    }

    fn tool_result(name: &str, result: &str) -> StreamEvent {
        StreamEvent::ToolResult {
            name: name.to_string(),
            result: Some(result.to_string()),
        }
    }

    #[test]
    fn test_text_chunks_append() {
        let mut message = ChatMessage::assistant();
        assert_eq!(
            message.apply_event(StreamEvent::TextChunk { content: "Speed is ".into() }),
            FoldStep::Continue
        );
        message.apply_event(StreamEvent::TextChunk { content: "95 km/h".into() });
        assert_eq!(message.content, "Speed is 95 km/h");
    }

    #[test]
    fn test_tool_result_matches_most_recent_calling_record() {
        let mut message = ChatMessage::assistant();
        message.apply_event(tool_call("get_signal"));
        message.apply_event(tool_result("get_signal", "95"));
        message.apply_event(tool_call("get_signal"));
        message.apply_event(tool_result("get_signal", "96"));

        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].status, ToolCallStatus::Done);
        assert_eq!(message.tool_calls[0].result.as_deref(), Some("95"));
        assert_eq!(message.tool_calls[1].status, ToolCallStatus::Done);
        assert_eq!(message.tool_calls[1].result.as_deref(), Some("96"));
    }

    #[test]
    fn test_tool_result_does_not_touch_earlier_done_record() {
        let mut message = ChatMessage::assistant();
        message.apply_event(tool_call("get_signal"));
        message.apply_event(tool_result("get_signal", "first"));
        message.apply_event(tool_call("get_signal"));
        message.apply_event(tool_result("get_signal", "second"));
        // A stray result with no open call leaves both records alone.
        message.apply_event(tool_result("get_signal", "stray"));

        assert_eq!(message.tool_calls[0].result.as_deref(), Some("first"));
        assert_eq!(message.tool_calls[1].result.as_deref(), Some("second"));
    }

    #[test]
    fn test_tool_result_with_error_payload_marks_error() {
        let mut message = ChatMessage::assistant();
        message.apply_event(tool_call("set_actuator"));
        message.apply_event(tool_result("set_actuator", r#"{"error": "Databroker unreachable"}"#));
        assert_eq!(message.tool_calls[0].status, ToolCallStatus::Error);
    }

    #[test]
    fn test_interleaved_tool_names() {
        let mut message = ChatMessage::assistant();
        message.apply_event(tool_call("get_signal"));
        message.apply_event(tool_call("get_dtc"));
        message.apply_event(tool_result("get_signal", "95"));

        assert_eq!(message.tool_calls[0].status, ToolCallStatus::Done);
        assert_eq!(message.tool_calls[1].status, ToolCallStatus::Calling);
    }

    #[test]
    fn test_null_args_become_empty_object() {
        let mut message = ChatMessage::assistant();
        message.apply_event(StreamEvent::ToolCall {
            name: "list_dtcs".into(),
            args: serde_json::Value::Null,
        });
        assert_eq!(message.tool_calls[0].args, json!({}));
    }

    #[test]
    fn test_terminal_events() {
        let mut message = ChatMessage::assistant();
        assert_eq!(message.apply_event(StreamEvent::Done), FoldStep::Completed);
        assert_eq!(
            message.apply_event(StreamEvent::Error { message: "quota".into() }),
            FoldStep::Failed("quota".into())
        );
    }
}
