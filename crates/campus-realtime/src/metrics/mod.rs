//! Per-hub lifecycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters kept for every hub handle.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Handshake attempts (initial and reconnect).
    pub handshakes: AtomicU64,
    /// Connections torn down after the last release.
    pub teardowns: AtomicU64,
    /// Reconnect attempts after a transport drop.
    pub reconnect_attempts: AtomicU64,
    /// Push events delivered to at least one handler.
    pub events_dispatched: AtomicU64,
    /// Invokes written to the transport.
    pub invokes_sent: AtomicU64,
    /// Invokes that resolved with an error.
    pub invokes_failed: AtomicU64,
}

impl HubMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_handshake(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invoke(&self) {
        self.invokes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invoke_failure(&self) {
        self.invokes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            handshakes: self.handshakes.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            invokes_sent: self.invokes_sent.load(Ordering::Relaxed),
            invokes_failed: self.invokes_failed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubMetricsSnapshot {
    /// Handshake attempts
    pub handshakes: u64,
    /// Teardowns executed
    pub teardowns: u64,
    /// Reconnect attempts
    pub reconnect_attempts: u64,
    /// Events dispatched
    pub events_dispatched: u64,
    /// Invokes sent
    pub invokes_sent: u64,
    /// Invokes failed
    pub invokes_failed: u64,
}
