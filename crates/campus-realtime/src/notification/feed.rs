//! Live notifications feed on the notifications hub.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use campus_core::AppResult;
use campus_core::types::NotificationId;

use crate::channel::Subscription;
use crate::connection::{ConnectionHandle, HubConnectionManager};
use crate::hub::HubHandle;

use super::dedup::EventDeduplicator;
use super::types::{
    ANNOUNCEMENT_READ, ANNOUNCEMENT_SENT, Announcement, AnnouncementRead, FeedItem, FeedSnapshot,
    FeedSource, NOTIFICATION_RECEIVED, Notification,
};

/// Repeated deliveries of the same item inside this window are dropped.
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Items kept in memory, newest first.
const FEED_CAPACITY: usize = 200;

/// Feed contents and the watch channel publishing them.
#[derive(Debug)]
pub struct FeedStore {
    items: Mutex<Vec<FeedItem>>,
    dedup: EventDeduplicator,
    tx: watch::Sender<FeedSnapshot>,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(FeedSnapshot::default());
        Self {
            items: Mutex::new(Vec::new()),
            dedup: EventDeduplicator::new(DEDUP_WINDOW),
            tx,
        }
    }

    /// Add a newly pushed item. Returns `false` for a duplicate delivery.
    pub fn push(&self, item: FeedItem) -> bool {
        let key = EventDeduplicator::make_key(source_key(item.source), item.id);
        if !self.dedup.should_dispatch(&key) {
            debug!(id = %item.id, "Duplicate feed delivery dropped");
            return false;
        }

        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items
            .iter()
            .any(|i| i.id == item.id && i.source == item.source)
        {
            debug!(id = %item.id, "Feed item already present");
            return false;
        }
        items.insert(0, item);
        items.truncate(FEED_CAPACITY);
        self.publish(&items);
        true
    }

    /// Mark an item read. Returns `false` if it was unknown or already read.
    pub fn mark_read(&self, source: FeedSource, id: NotificationId) -> bool {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let Some(item) = items
            .iter_mut()
            .find(|i| i.id == id && i.source == source && !i.read)
        else {
            return false;
        };
        item.read = true;
        self.publish(&items);
        true
    }

    /// Current contents.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.tx.borrow().clone()
    }

    /// Watch for changes.
    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.tx.subscribe()
    }

    fn publish(&self, items: &[FeedItem]) {
        let snapshot = FeedSnapshot {
            unread_count: items.iter().filter(|i| !i.read).count(),
            items: items.to_vec(),
        };
        self.tx.send_replace(snapshot);
    }
}

fn source_key(source: FeedSource) -> &'static str {
    match source {
        FeedSource::Notification => NOTIFICATION_RECEIVED,
        FeedSource::Announcement => ANNOUNCEMENT_SENT,
    }
}

/// Subscribes to the notifications hub for as long as it is alive.
///
/// Dropping the feed disposes its subscriptions and releases the hub.
#[derive(Debug)]
pub struct NotificationFeed {
    hub: HubHandle,
    store: Arc<FeedStore>,
    subscriptions: Vec<Subscription>,
    lease: Option<ConnectionHandle>,
}

impl NotificationFeed {
    /// Attach to the notifications hub.
    pub async fn attach(manager: &HubConnectionManager) -> AppResult<Self> {
        Self::attach_to(manager, HubHandle::notifications()).await
    }

    /// Attach to an arbitrary hub speaking the notifications contract.
    pub async fn attach_to(manager: &HubConnectionManager, hub: HubHandle) -> AppResult<Self> {
        let store = Arc::new(FeedStore::new());

        // Handlers go in before the connection so no early push is missed.
        let on_notification = Arc::clone(&store);
        let on_announcement = Arc::clone(&store);
        let on_read = Arc::clone(&store);
        let subscriptions = vec![
            manager.subscribe_typed(&hub, NOTIFICATION_RECEIVED, move |n: Notification| {
                on_notification.push(n.into());
            }),
            manager.subscribe_typed(&hub, ANNOUNCEMENT_SENT, move |a: Announcement| {
                on_announcement.push(a.into());
            }),
            manager.subscribe_typed(&hub, ANNOUNCEMENT_READ, move |r: AnnouncementRead| {
                on_read.mark_read(FeedSource::Announcement, r.id);
            }),
        ];

        let lease = manager.acquire(&hub).await?;
        info!(hub = %hub, "Notifications feed attached");

        Ok(Self {
            hub,
            store,
            subscriptions,
            lease: Some(lease),
        })
    }

    /// Current feed contents.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.store.snapshot()
    }

    /// Unread items.
    pub fn unread_count(&self) -> usize {
        self.store.snapshot().unread_count
    }

    /// Watch for feed changes.
    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.store.watch()
    }

    /// Mark an item read locally.
    pub fn mark_read(&self, source: FeedSource, id: NotificationId) -> bool {
        self.store.mark_read(source, id)
    }

    /// Unsubscribe and release the hub. Idempotent.
    pub fn detach(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
        if let Some(lease) = self.lease.take() {
            lease.release();
            debug!(hub = %self.hub, "Notifications feed detached");
        }
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.detach();
    }
}
