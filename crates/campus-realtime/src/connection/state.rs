//! Per-hub connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the single connection behind a hub handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport; the next acquire starts a handshake.
    #[default]
    Disconnected,
    /// The single in-flight handshake for this hub.
    Connecting,
    /// Transport established; invokes are accepted.
    Connected,
    /// Transport dropped; the manager is retrying with backoff.
    Reconnecting,
}

impl ConnectionState {
    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Whether a logical connection exists (possibly mid-reconnect).
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
