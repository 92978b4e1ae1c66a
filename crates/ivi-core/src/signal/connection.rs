use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a persistent connection.
///
/// Edges: `Disconnected -> Connecting` on connect, `Connecting -> Connected`
/// when the transport opens, `Connected -> Connecting` on an unexpected drop,
/// and any state `-> Disconnected` on an intentional disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state plus the most recent error, as shown in the status bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub connection: ConnectionState,
    pub last_error: Option<String>,
}
