//! Student side of the live queue.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use campus_core::types::SlotId;
use campus_core::{AppError, AppResult, ErrorKind};
use campus_realtime::{ConnectionHandle, HubConnectionManager, HubHandle, Subscription};

use crate::api::OfficeHoursApi;
use crate::contract::{JOIN_AS_STUDENT, STUDENT_VIEW_UPDATED};
use crate::entry::{QueueEntry, ReadySession};
use crate::presence::CheckInSink;
use crate::resync::{RejoinTask, spawn_rejoin};
use crate::state::{StudentView, StudentViewStore};

/// Shared by the client and its check-in handles.
#[derive(Debug)]
struct StudentShared {
    api: Arc<dyn OfficeHoursApi>,
    slot: SlotId,
    store: StudentViewStore,
}

impl StudentShared {
    async fn refetch(&self) {
        match self.api.status(self.slot).await {
            Ok(entry) => {
                let outcome = self.store.apply(entry);
                debug!(slot_id = %self.slot, ?outcome, "Student view re-fetched");
            }
            Err(e) => warn!(slot_id = %self.slot, error = %e, "Student view re-fetch failed"),
        }
    }

    /// Protocol-level rejections mean our view is stale.
    async fn refetch_if_stale(&self, error: &AppError) {
        if error.kind.requires_refetch() {
            self.refetch().await;
        }
    }

    async fn check_in(&self, token: &str) -> AppResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::invalid_token("Check-in token is empty"));
        }

        match self.api.check_in(self.slot, token).await {
            Ok(entry) => {
                info!(slot_id = %self.slot, "Check-in accepted");
                if entry.is_some() {
                    self.store.apply(entry);
                }
                Ok(())
            }
            Err(e) if e.kind.is_connection_level() || e.is(ErrorKind::Authentication) => Err(e),
            Err(e) => {
                warn!(slot_id = %self.slot, code = %e.kind, "Check-in rejected");
                self.refetch().await;
                Err(AppError::invalid_token(e.message))
            }
        }
    }
}

/// Cloneable handle that submits check-in tokens for one slot.
#[derive(Debug, Clone)]
pub struct StudentCheckIn {
    shared: Arc<StudentShared>,
}

#[async_trait]
impl CheckInSink for StudentCheckIn {
    async fn check_in(&self, token: &str) -> AppResult<()> {
        self.shared.check_in(token).await
    }
}

/// A student's live view of their place in one slot's queue.
///
/// Holds one acquisition of the office-hours hub and one subscription to
/// `StudentViewUpdated`. After every reconnect it re-joins the slot's push
/// group and re-fetches its entry. [`QueueClient::detach`] (or drop) gives
/// everything back.
#[derive(Debug)]
pub struct QueueClient {
    hub: HubHandle,
    shared: Arc<StudentShared>,
    subscription: Option<Subscription>,
    lease: Option<ConnectionHandle>,
    rejoin: Option<RejoinTask>,
}

impl QueueClient {
    /// Attach to `slot`: subscribe, connect, join the push group and seed
    /// the view from a point-in-time status query.
    pub async fn attach(
        manager: &HubConnectionManager,
        api: Arc<dyn OfficeHoursApi>,
        slot: SlotId,
    ) -> AppResult<Self> {
        let hub = HubHandle::office_hours();
        let shared = Arc::new(StudentShared {
            api,
            slot,
            store: StudentViewStore::new(),
        });

        let on_update = Arc::clone(&shared);
        let subscription = manager.subscribe_typed(
            &hub,
            STUDENT_VIEW_UPDATED,
            move |snapshot: Option<QueueEntry>| {
                if snapshot.as_ref().is_some_and(|e| !e.belongs_to(slot)) {
                    return;
                }
                let outcome = on_update.store.apply(snapshot);
                debug!(slot_id = %slot, ?outcome, "Student snapshot pushed");
            },
        );

        let lease = manager.acquire(&hub).await?;
        let resync = Arc::clone(&shared);
        let rejoin = spawn_rejoin(manager, &hub, JOIN_AS_STUDENT, slot, move || {
            let resync = Arc::clone(&resync);
            async move { resync.refetch().await }
        });
        manager
            .invoke(&hub, JOIN_AS_STUDENT, vec![Value::from(slot.get())])
            .await?;

        let client = Self {
            hub,
            shared,
            subscription: Some(subscription),
            lease: Some(lease),
            rejoin: Some(rejoin),
        };
        client.get_status().await?;
        info!(slot_id = %slot, "Student queue client attached");
        Ok(client)
    }

    /// The slot this client follows.
    pub fn slot(&self) -> SlotId {
        self.shared.slot
    }

    /// Request a place in the queue.
    ///
    /// Fails with `AlreadyQueued` or `SlotClosed`; the view is re-fetched
    /// before such an error is returned.
    pub async fn join(&self, metadata: Value) -> AppResult<()> {
        let shared = &self.shared;
        match shared.api.join(shared.slot, &metadata).await {
            Ok(entry) => {
                info!(slot_id = %shared.slot, "Joined queue");
                if entry.is_some() {
                    shared.store.apply(entry);
                }
                Ok(())
            }
            Err(e) => {
                shared.refetch_if_stale(&e).await;
                Err(e)
            }
        }
    }

    /// Point-in-time query of the student's entry; also applied to the view.
    pub async fn get_status(&self) -> AppResult<Option<QueueEntry>> {
        let entry = self.shared.api.status(self.shared.slot).await?;
        self.shared.store.apply(entry.clone());
        Ok(entry)
    }

    /// Submit a scanned or typed token. Any rejection by the server is
    /// reported as `InvalidOrExpiredToken`.
    pub async fn check_in(&self, token: &str) -> AppResult<()> {
        self.shared.check_in(token).await
    }

    /// A handle for the proof-of-presence flow.
    pub fn check_in_handle(&self) -> StudentCheckIn {
        StudentCheckIn {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current view.
    pub fn view(&self) -> StudentView {
        self.shared.store.current()
    }

    /// Current entry.
    pub fn entry(&self) -> Option<QueueEntry> {
        self.view().entry().cloned()
    }

    /// Pending ready session, if any.
    pub fn ready_session(&self) -> Option<ReadySession> {
        self.view().ready_session()
    }

    /// Watch view changes.
    pub fn watch(&self) -> watch::Receiver<StudentView> {
        self.shared.store.watch()
    }

    /// Unsubscribe and release the hub. Idempotent.
    pub fn detach(&mut self) {
        self.rejoin = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
        if let Some(lease) = self.lease.take() {
            lease.release();
            debug!(hub = %self.hub, slot_id = %self.shared.slot, "Student queue client detached");
        }
    }
}

impl Drop for QueueClient {
    fn drop(&mut self) {
        self.detach();
    }
}
