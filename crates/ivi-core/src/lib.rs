//! Domain types for the IVI dashboard: signal values and records, connection
//! state, conversation messages and the agent stream event fold.

pub mod chat;
pub mod config;
pub mod error;
pub mod signal;

// Re-export common error type
pub use error::{IviError, Result};
