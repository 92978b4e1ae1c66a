//! Chat domain module.
//!
//! # Module Structure
//!
//! - `message`: conversation turns and tool calls (`ChatMessage`, `ToolCallRecord`)
//! - `event`: typed agent stream events (`StreamEvent`)
//! - `fold`: applying events to the open assistant message (`FoldStep`)

mod event;
mod fold;
mod message;

pub use event::{StreamEvent, is_error_result};
pub use fold::FoldStep;
pub use message::{
    ChatMessage, ChatRequest, HistoryEntry, MessageRole, ToolCallRecord, ToolCallStatus,
    history_from,
};

/// Chat state as seen by the renderer.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    /// An assistant turn is currently streaming.
    pub streaming: bool,
    /// Error of the most recent turn, if it failed.
    pub error: Option<String>,
}
