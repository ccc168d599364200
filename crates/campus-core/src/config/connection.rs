//! Hub connection lifecycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hub connection manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Delay between the last release and the actual teardown, in milliseconds.
    #[serde(default = "default_teardown_grace")]
    pub teardown_grace_ms: u64,
    /// Deadline for a single hub invoke, in seconds.
    #[serde(default = "default_invoke_timeout")]
    pub invoke_timeout_seconds: u64,
    /// Deadline for a single connect attempt, in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
    /// Keepalive ping interval in seconds (0 disables keepalive).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Silence after which the link is considered dropped, in seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
    /// Buffer size of the per-link frame channels.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

impl ConnectionConfig {
    /// Teardown grace period.
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    /// Invoke deadline.
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_seconds)
    }

    /// Handshake deadline.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }

    /// Keepalive interval, `None` when disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_seconds > 0).then(|| Duration::from_secs(self.ping_interval_seconds))
    }

    /// Maximum tolerated silence on a link.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_seconds)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            teardown_grace_ms: default_teardown_grace(),
            invoke_timeout_seconds: default_invoke_timeout(),
            handshake_timeout_seconds: default_handshake_timeout(),
            ping_interval_seconds: default_ping_interval(),
            ping_timeout_seconds: default_ping_timeout(),
            channel_buffer_size: default_channel_buffer(),
        }
    }
}

fn default_teardown_grace() -> u64 {
    250
}

fn default_invoke_timeout() -> u64 {
    15
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    15
}

fn default_ping_timeout() -> u64 {
    30
}

fn default_channel_buffer() -> usize {
    256
}
