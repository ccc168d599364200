//! Handler registry: event name to handlers for one hub.
//!
//! The registry belongs to the hub slot, not to a transport link, so
//! handlers stay attached across reconnects without re-registration.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;

use super::channel::{EventChannel, EventHandler, SubscriptionId};

/// Registry of all handlers attached to one hub.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    /// Event name → handlers.
    channels: DashMap<String, EventChannel>,
    /// Next subscription id.
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Creates a new registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an event and returns its id.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.channels
            .entry(event.to_string())
            .or_insert_with(|| EventChannel::new(event.to_string()))
            .subscribe(id, handler);
        id
    }

    /// Removes one handler; other handlers for the same event are untouched.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut channel) = self.channels.get_mut(event) {
            removed = channel.unsubscribe(id);
            if channel.is_empty() {
                drop(channel);
                self.channels.remove_if(event, |_, c| c.is_empty());
            }
        }
        removed
    }

    /// Invokes every handler for `event` in registration order.
    ///
    /// Handlers run outside the registry lock, so a handler may dispose its
    /// own subscription. Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &str, arguments: &[Value]) -> usize {
        let handlers = self
            .channels
            .get(event)
            .map(|c| c.handlers())
            .unwrap_or_default();
        for handler in &handlers {
            handler(arguments);
        }
        handlers.len()
    }

    /// Returns handler count for an event.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.channels
            .get(event)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    /// Returns the number of event names with at least one handler.
    pub fn event_count(&self) -> usize {
        self.channels.len()
    }
}
