//! Proof-of-presence (QR check-in) configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// QR scanning and token display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Interval between decode attempts, in milliseconds.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    /// Tokens are hidden this many seconds before their server expiry.
    #[serde(default = "default_expiry_margin")]
    pub token_expiry_margin_seconds: u64,
}

impl PresenceConfig {
    /// Decode polling interval.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(1))
    }

    /// Local safety margin before token expiry.
    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.token_expiry_margin_seconds)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval(),
            token_expiry_margin_seconds: default_expiry_margin(),
        }
    }
}

fn default_scan_interval() -> u64 {
    450
}

fn default_expiry_margin() -> u64 {
    5
}
