//! Ping keepalive for an established hub link.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Tracks liveness of one transport link.
///
/// Any inbound frame counts as proof of life. The driver sends a ping on
/// every tick and treats silence longer than `timeout` as a dropped link.
#[derive(Debug)]
pub struct Keepalive {
    ticker: Option<Interval>,
    timeout: Duration,
    last_seen: Instant,
}

impl Keepalive {
    /// Create a keepalive. `interval = None` disables pings and timeouts.
    pub fn new(interval: Option<Duration>, timeout: Duration) -> Self {
        let ticker = interval.map(|period| {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        Self {
            ticker,
            timeout,
            last_seen: Instant::now(),
        }
    }

    /// Record an inbound frame.
    pub fn observe(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Wait for the next ping tick. Never resolves when disabled.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Whether the link has been silent longer than the timeout.
    pub fn is_expired(&self) -> bool {
        self.ticker.is_some() && self.last_seen.elapsed() > self.timeout
    }

    /// Time since the last inbound frame.
    pub fn silence(&self) -> Duration {
        self.last_seen.elapsed()
    }
}
