//! Handlers attached to a single event name.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Unique subscription identifier within a hub.
pub type SubscriptionId = u64;

/// Callback invoked with the positional arguments of a pushed event.
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// The ordered handler list for one event name.
#[derive(Clone)]
pub struct EventChannel {
    /// Event name.
    pub name: String,
    /// Handlers in registration order.
    handlers: Vec<(SubscriptionId, EventHandler)>,
}

impl EventChannel {
    /// Creates a new empty channel.
    pub fn new(name: String) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    /// Appends a handler.
    pub fn subscribe(&mut self, id: SubscriptionId, handler: EventHandler) {
        self.handlers.push((id, handler));
    }

    /// Removes exactly the handler registered under `id`.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _)| *sid != id);
        self.handlers.len() < before
    }

    /// Returns handler count.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    /// Returns whether the channel has any handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the handlers in registration order.
    pub fn handlers(&self) -> Vec<EventHandler> {
        self.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}
