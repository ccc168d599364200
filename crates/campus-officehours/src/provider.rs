//! Provider side of the live queue.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use campus_core::AppResult;
use campus_core::types::SlotId;
use campus_realtime::{ConnectionHandle, HubConnectionManager, HubHandle, Subscription};

use crate::api::OfficeHoursApi;
use crate::contract::{JOIN_AS_PROVIDER, PROVIDER_VIEW_UPDATED};
use crate::entry::{ProviderAction, ProviderView};
use crate::resync::{RejoinTask, spawn_rejoin};
use crate::state::ProviderViewStore;

/// A provider's live view of one slot.
///
/// Mutations are checked against the latest snapshot first. A failing check
/// re-fetches once and re-checks before rejecting without touching the
/// network; a passing check leaves the final word to the server.
///
/// Pushes for other slots are ignored. After every reconnect the client
/// re-joins the provider push group and re-fetches the view.
#[derive(Debug)]
pub struct ProviderClient {
    hub: HubHandle,
    slot: SlotId,
    api: Arc<dyn OfficeHoursApi>,
    store: Arc<ProviderViewStore>,
    subscription: Option<Subscription>,
    lease: Option<ConnectionHandle>,
    rejoin: Option<RejoinTask>,
}

impl ProviderClient {
    /// Attach to `slot`: subscribe, connect, join the provider push group
    /// and seed the view.
    pub async fn attach(
        manager: &HubConnectionManager,
        api: Arc<dyn OfficeHoursApi>,
        slot: SlotId,
    ) -> AppResult<Self> {
        let hub = HubHandle::office_hours();
        let store = Arc::new(ProviderViewStore::new());

        let on_update = Arc::clone(&store);
        let subscription =
            manager.subscribe_typed(&hub, PROVIDER_VIEW_UPDATED, move |view: ProviderView| {
                if !view.belongs_to(slot) {
                    return;
                }
                let outcome = on_update.replace(view);
                debug!(slot_id = %slot, ?outcome, "Provider snapshot pushed");
            });

        let lease = manager.acquire(&hub).await?;
        let (resync_api, resync_store) = (Arc::clone(&api), Arc::clone(&store));
        let rejoin = spawn_rejoin(manager, &hub, JOIN_AS_PROVIDER, slot, move || {
            let (api, store) = (Arc::clone(&resync_api), Arc::clone(&resync_store));
            async move {
                match api.provider_view(slot).await {
                    Ok(view) => {
                        let outcome = store.replace(view);
                        debug!(slot_id = %slot, ?outcome, "Provider view re-fetched");
                    }
                    Err(e) => warn!(slot_id = %slot, error = %e, "Provider view re-fetch failed"),
                }
            }
        });
        manager
            .invoke(&hub, JOIN_AS_PROVIDER, vec![Value::from(slot.get())])
            .await?;

        let client = Self {
            hub,
            slot,
            api,
            store,
            subscription: Some(subscription),
            lease: Some(lease),
            rejoin: Some(rejoin),
        };
        client.get_view().await?;
        info!(slot_id = %slot, "Provider queue client attached");
        Ok(client)
    }

    /// The slot this client manages.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Fetch the canonical snapshot and replace the local view with it.
    pub async fn get_view(&self) -> AppResult<ProviderView> {
        let view = self.api.provider_view(self.slot).await?;
        self.store.replace(view.clone());
        Ok(view)
    }

    /// Promote the next waiting student.
    ///
    /// Fails with `NoOneWaiting` on an empty queue and `AlreadyServicing`
    /// while the current entry is Ready or InProgress.
    pub async fn call_next(&self) -> AppResult<()> {
        self.perform(ProviderAction::CallNext).await
    }

    /// Finish the current entry. Valid only while it is InProgress.
    pub async fn complete_current(&self) -> AppResult<()> {
        self.perform(ProviderAction::CompleteCurrent).await
    }

    /// Mark the current entry as a no-show. Valid only while it is Ready.
    pub async fn mark_no_show(&self) -> AppResult<()> {
        self.perform(ProviderAction::MarkNoShow).await
    }

    async fn perform(&self, action: ProviderAction) -> AppResult<()> {
        if let Err(local) = self.store.current().guard(action) {
            debug!(slot_id = %self.slot, %action, code = %local.kind, "Guard failed, re-fetching");
            let fresh = self.get_view().await?;
            if let Err(e) = fresh.guard(action) {
                warn!(slot_id = %self.slot, %action, code = %e.kind, "Provider action rejected locally");
                return Err(e);
            }
        }

        let result = match action {
            ProviderAction::CallNext => self.api.call_next(self.slot).await,
            ProviderAction::CompleteCurrent => self.api.complete_current(self.slot).await,
            ProviderAction::MarkNoShow => self.api.mark_no_show(self.slot).await,
        };

        match result {
            Ok(()) => {
                info!(slot_id = %self.slot, %action, "Provider action accepted");
                Ok(())
            }
            Err(e) => {
                warn!(slot_id = %self.slot, %action, code = %e.kind, "Provider action failed");
                if e.kind.requires_refetch() {
                    self.refetch_quietly().await;
                }
                Err(e)
            }
        }
    }

    async fn refetch_quietly(&self) {
        if let Err(e) = self.get_view().await {
            warn!(slot_id = %self.slot, error = %e, "Provider view re-fetch failed");
        }
    }

    /// Current view.
    pub fn view(&self) -> ProviderView {
        self.store.current()
    }

    /// Watch view changes.
    pub fn watch(&self) -> watch::Receiver<ProviderView> {
        self.store.watch()
    }

    /// Unsubscribe and release the hub. Idempotent.
    pub fn detach(&mut self) {
        self.rejoin = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
        if let Some(lease) = self.lease.take() {
            lease.release();
            debug!(hub = %self.hub, slot_id = %self.slot, "Provider queue client detached");
        }
    }
}

impl Drop for ProviderClient {
    fn drop(&mut self) {
        self.detach();
    }
}

