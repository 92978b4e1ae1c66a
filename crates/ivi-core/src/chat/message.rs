//! Conversation message types.
//!
//! This module contains types for representing turns in a conversation with
//! the vehicle agent, including the tool calls surfaced while a turn streams.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
}

/// Lifecycle of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Calling,
    Done,
    Error,
}

/// One tool invocation surfaced mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: serde_json::Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCallRecord {
    pub fn calling(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
            status: ToolCallStatus::Calling,
            result: None,
        }
    }
}

/// A single turn in the conversation.
///
/// User messages are complete when created. Assistant messages start empty and
/// grow while their stream is open; `content` is only ever appended to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Timestamp when the message was created (ISO 8601 format).
    pub timestamp: String,
}

impl ChatMessage {
    fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    /// An empty assistant message waiting for its stream.
    pub fn assistant() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }
}

/// Role/content pair sent back to the agent as conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

/// Body of a chat request: the new user message plus prior turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, prior: &[ChatMessage]) -> Self {
        Self {
            message: message.into(),
            history: history_from(prior),
        }
    }
}

/// Builds request history from prior turns.
///
/// Messages with empty content (an assistant turn that only made tool calls)
/// are left out.
pub fn history_from(messages: &[ChatMessage]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .filter(|message| !message.content.is_empty())
        .map(|message| HistoryEntry {
            role: message.role,
            content: message.content.clone(),
        })
        .collect()
}
