//! Integration tests for the notifications feed over the shared hub manager.

mod helpers;

use std::time::Duration;

use serde_json::json;

use campus_core::types::NotificationId;
use campus_realtime::notification::{FeedSource, NotificationPriority};
use campus_realtime::{ConnectionState, HubHandle, NotificationFeed};

use helpers::{TestApp, wait_until};

#[tokio::test(start_paused = true)]
async fn test_pushed_items_land_in_feed_newest_first() {
    let app = TestApp::new();
    let hub = HubHandle::notifications();
    let feed = NotificationFeed::attach(&app.manager).await.unwrap();
    let mut watch = feed.watch();

    app.transport
        .push(
            &hub,
            "NotificationReceived",
            vec![json!({ "id": 1, "title": "Slot moved", "priority": "high" })],
        )
        .await;
    app.transport
        .push(
            &hub,
            "AnnouncementSent",
            vec![json!({ "id": 2, "title": "Library closed", "content": "Friday" })],
        )
        .await;

    let snapshot = wait_until(&mut watch, |s| s.items.len() == 2).await;
    assert_eq!(snapshot.unread_count, 2);
    assert_eq!(snapshot.items[0].source, FeedSource::Announcement);
    assert_eq!(snapshot.items[0].body.as_deref(), Some("Friday"));
    assert_eq!(snapshot.items[1].priority, NotificationPriority::High);
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_notification_is_ignored() {
    let app = TestApp::new();
    let hub = HubHandle::notifications();
    let feed = NotificationFeed::attach(&app.manager).await.unwrap();

    let payload = json!({ "id": 9, "title": "Grades posted" });
    for _ in 0..3 {
        app.transport
            .push(&hub, "NotificationReceived", vec![payload.clone()])
            .await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(feed.snapshot().items.len(), 1);
    assert_eq!(feed.unread_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_receipt_from_other_device_clears_unread() {
    let app = TestApp::new();
    let hub = HubHandle::notifications();
    let feed = NotificationFeed::attach(&app.manager).await.unwrap();
    let mut watch = feed.watch();

    app.transport
        .push(&hub, "AnnouncementSent", vec![json!({ "id": 4, "title": "Welcome" })])
        .await;
    wait_until(&mut watch, |s| s.unread_count == 1).await;

    app.transport
        .push(&hub, "AnnouncementRead", vec![json!({ "announcementId": 4 })])
        .await;
    let snapshot = wait_until(&mut watch, |s| s.unread_count == 0).await;

    assert!(snapshot.items[0].read);
    assert!(!feed.mark_read(FeedSource::Announcement, NotificationId::new(4)));
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_payload_is_skipped() {
    let app = TestApp::new();
    let hub = HubHandle::notifications();
    let feed = NotificationFeed::attach(&app.manager).await.unwrap();

    app.transport
        .push(&hub, "NotificationReceived", vec![json!("not an object")])
        .await;
    app.transport
        .push(&hub, "NotificationReceived", vec![json!({ "id": 3, "title": "ok" })])
        .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(feed.snapshot().items.len(), 1);
    assert_eq!(app.manager.state(&hub), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_feed_and_queue_use_separate_hubs() {
    let app = TestApp::new();
    let feed_hub = HubHandle::notifications();
    let mut feed = NotificationFeed::attach(&app.manager).await.unwrap();
    let queue_lease = app.manager.acquire(&app.hub()).await.unwrap();

    assert_eq!(app.transport.handshakes(&feed_hub), 1);
    assert_eq!(app.transport.handshakes(&app.hub()), 1);

    feed.detach();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(app.manager.state(&feed_hub), ConnectionState::Disconnected);
    assert_eq!(app.manager.subscriber_count(&feed_hub, "NotificationReceived"), 0);
    assert_eq!(queue_lease.state(), ConnectionState::Connected);
}
