//! Suppression of repeated deliveries within a time window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Drops a key seen again inside the window.
///
/// Hub delivery is at-least-once, so the same notification can arrive twice
/// around a reconnect.
#[derive(Debug)]
pub struct EventDeduplicator {
    /// Window duration
    window: Duration,
    /// Last seen time per key
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl EventDeduplicator {
    /// Create a new deduplicator with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the event should proceed, `false` if it's a duplicate.
    pub fn should_dispatch(&self, key: &str) -> bool {
        let mut map = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }

        map.insert(key.to_string(), now);
        if map.len() > 1024 {
            let cutoff = self.window;
            map.retain(|_, seen| now.duration_since(*seen) < cutoff);
        }
        true
    }

    /// Build a dedup key from event components
    pub fn make_key(event: &str, id: impl std::fmt::Display) -> String {
        format!("{event}:{id}")
    }
}
