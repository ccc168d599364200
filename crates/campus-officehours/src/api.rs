//! Request/response seam for queue actions.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use campus_core::AppResult;
use campus_core::types::SlotId;

use crate::entry::{ProviderView, QueueEntry};

/// Office-hours REST operations.
///
/// Failures carry the backend's error code mapped onto
/// [`campus_core::ErrorKind`], so callers can tell protocol-level
/// rejections from transport failures.
#[async_trait]
pub trait OfficeHoursApi: Send + Sync + fmt::Debug + 'static {
    /// Enter the queue. Returns the created entry when the backend echoes it.
    async fn join(&self, slot: SlotId, metadata: &Value) -> AppResult<Option<QueueEntry>>;

    /// The caller's entry in the slot, if any.
    async fn status(&self, slot: SlotId) -> AppResult<Option<QueueEntry>>;

    /// Submit a proof-of-presence token.
    async fn check_in(&self, slot: SlotId, token: &str) -> AppResult<Option<QueueEntry>>;

    /// Provider snapshot of the slot.
    async fn provider_view(&self, slot: SlotId) -> AppResult<ProviderView>;

    /// Promote the next waiting entry to Ready.
    async fn call_next(&self, slot: SlotId) -> AppResult<()>;

    /// Finish the InProgress entry.
    async fn complete_current(&self, slot: SlotId) -> AppResult<()>;

    /// Mark the Ready entry as a no-show.
    async fn mark_no_show(&self, slot: SlotId) -> AppResult<()>;
}
