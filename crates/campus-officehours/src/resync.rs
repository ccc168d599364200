//! Push-group re-join after the office-hours hub reconnects.
//!
//! Group membership lives on the server side of a link and events pushed
//! while the hub was reconnecting are lost, so each new link is followed by
//! a re-join and a canonical re-fetch.

use std::future::Future;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use campus_core::types::SlotId;
use campus_realtime::{HubConnectionManager, HubHandle};

/// Background re-join task; aborted when dropped.
#[derive(Debug)]
pub(crate) struct RejoinTask {
    handle: JoinHandle<()>,
}

impl Drop for RejoinTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Re-invoke `method` for `slot` and run `refetch` after every new link.
///
/// Links established before this call do not trigger it.
pub(crate) fn spawn_rejoin<F, Fut>(
    manager: &HubConnectionManager,
    hub: &HubHandle,
    method: &'static str,
    slot: SlotId,
    refetch: F,
) -> RejoinTask
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let mut links = manager.watch_links(hub);
    let manager = manager.clone();
    let hub = hub.clone();
    let handle = tokio::spawn(async move {
        while links.changed().await.is_ok() {
            info!(hub = %hub, slot_id = %slot, method, "Hub reconnected, re-joining push group");
            if let Err(e) = manager
                .invoke(&hub, method, vec![Value::from(slot.get())])
                .await
            {
                warn!(hub = %hub, slot_id = %slot, method, error = %e, "Push group re-join failed");
            }
            refetch().await;
        }
    });
    RejoinTask { handle }
}
