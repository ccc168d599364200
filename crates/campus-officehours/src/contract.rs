//! Office-hours hub method and event names.

/// Student joins the slot's push group. Argument: slot id.
pub const JOIN_AS_STUDENT: &str = "join-as-student";
/// Provider joins the slot's push group. Argument: slot id.
pub const JOIN_AS_PROVIDER: &str = "join-as-provider";

/// Pushes the student's current `QueueEntry` (or `null`).
pub const STUDENT_VIEW_UPDATED: &str = "StudentViewUpdated";
/// Pushes the provider's full `ProviderView`.
pub const PROVIDER_VIEW_UPDATED: &str = "ProviderViewUpdated";
