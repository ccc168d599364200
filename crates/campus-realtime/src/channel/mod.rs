//! Event handler registration per hub.

pub mod channel;
pub mod registry;
pub mod subscription;

pub use channel::{EventHandler, SubscriptionId};
pub use registry::HandlerRegistry;
pub use subscription::Subscription;
