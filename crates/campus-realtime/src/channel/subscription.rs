//! Subscription handles returned by `subscribe`.

use std::fmt;
use std::sync::Weak;

use tracing::debug;

use crate::hub::HubHandle;

use super::channel::SubscriptionId;
use super::registry::HandlerRegistry;

/// A live event subscription.
///
/// [`Subscription::dispose`] removes exactly this handler. Dropping the
/// handle disposes it as well, so a view that is torn down cannot leave a
/// handler behind. Disposing twice is a no-op.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    hub: HubHandle,
    event: String,
    id: SubscriptionId,
    registry: Weak<HandlerRegistry>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(
        hub: HubHandle,
        event: String,
        id: SubscriptionId,
        registry: Weak<HandlerRegistry>,
    ) -> Self {
        Self {
            hub,
            event,
            id,
            registry,
            active: true,
        }
    }

    /// The hub this subscription belongs to.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// The subscribed event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether the handler is still attached.
    pub fn is_active(&self) -> bool {
        self.active && self.registry.strong_count() > 0
    }

    /// Remove the handler.
    pub fn dispose(mut self) {
        self.detach_handler();
    }

    fn detach_handler(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.event, self.id);
            debug!(hub = %self.hub, event = %self.event, id = self.id, "Subscription disposed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_handler();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("hub", &self.hub)
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
