//! Logical hub identities.

use std::fmt;
use std::sync::Arc;

/// Opaque identity for one logical hub endpoint.
///
/// At most one live connection exists per `HubHandle` inside a
/// [`HubConnectionManager`](crate::HubConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HubHandle(Arc<str>);

impl HubHandle {
    /// Name of the notifications hub.
    pub const NOTIFICATIONS: &'static str = "notifications";
    /// Name of the office-hours hub.
    pub const OFFICE_HOURS: &'static str = "office-hours";

    /// Create a handle for an arbitrary hub name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The notifications hub (chat receipts, announcements).
    pub fn notifications() -> Self {
        Self::new(Self::NOTIFICATIONS)
    }

    /// The office-hours hub (live queue).
    pub fn office_hours() -> Self {
        Self::new(Self::OFFICE_HOURS)
    }

    /// Hub name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HubHandle {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
