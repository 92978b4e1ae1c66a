//! Error types for the IVI dashboard core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for every IVI crate.
///
/// Variants follow the failure taxonomy of the streaming layer: transport
/// problems are recovered by reconnecting, protocol problems are reported
/// without tearing the connection down, request problems are returned to the
/// caller, stream problems end the current assistant turn. Cancellation is a
/// variant of its own so callers can tell it apart from a real failure.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IviError {
    /// Connection refused, dropped socket, failed write.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed frame or an error reported by the signal server.
    #[error("Protocol error {code}: {reason} - {message}")]
    Protocol {
        code: String,
        reason: String,
        message: String,
    },

    /// A request that needs an open connection was made while disconnected.
    #[error("Not connected: cannot send request for '{path}'")]
    NotConnected { path: String },

    /// The assistant backend failed while producing a turn.
    #[error("Stream error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Stream {
        status: Option<u16>,
        message: String,
    },

    /// The operation was cancelled by the caller. Not a failure.
    #[error("Cancelled")]
    Cancelled,

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file access)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IviError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Protocol error from the server's code/reason/message triple.
    pub fn protocol(
        code: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            code: code.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Creates a NotConnected error for the given signal path
    pub fn not_connected(path: impl Into<String>) -> Self {
        Self::NotConnected { path: path.into() }
    }

    /// Creates a Stream error
    pub fn stream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Stream {
            status,
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Check if this is a request-while-disconnected error
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }

    /// Check if this is a stream error
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for IviError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for IviError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for IviError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, IviError>`.
pub type Result<T> = std::result::Result<T, IviError>;
