//! Reconnect-with-backoff configuration.

use serde::{Deserialize, Serialize};

/// Reconnect settings applied when an established hub link drops.
///
/// Attempt `n` (zero-based) waits `initial_delay_ms` for `n == 0` and
/// `min(base_delay_ms * multiplier^(n-1), max_delay_ms)` afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Whether dropped links are re-established at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attempts before the hub falls back to Disconnected.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            initial_delay_ms: 0,
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    2_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}
