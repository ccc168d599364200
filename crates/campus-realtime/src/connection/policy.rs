//! Declared reconnect policy.

use std::time::Duration;

use campus_core::config::ReconnectConfig;

/// Backoff schedule applied after an established link drops.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up (0 disables reconnecting).
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Delay before the second attempt; grows by `multiplier` afterwards.
    pub base_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// A policy with a constant delay between attempts.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay before zero-based `attempt`, or `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        if attempt == 0 {
            return Some(self.initial_delay.min(self.max_delay));
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 1);
        let millis = (self.base_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Some(Duration::from_millis(millis as u64))
    }

    /// Whether any reconnect attempt will be made.
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: if config.enabled { config.max_attempts } else { 0 },
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }
}
