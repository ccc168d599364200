//! Integration tests for the hub connection manager lifecycle.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;

use campus_core::ErrorKind;
use campus_core::config::ConnectionConfig;
use campus_realtime::{ConnectionState, InvokeReply};

use helpers::TestApp;

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquires_share_one_handshake() {
    let app = TestApp::new();
    app.transport.set_connect_delay(Duration::from_millis(200));
    let hub = app.hub();

    let handles = join_all((0..8).map(|_| app.manager.acquire(&hub))).await;

    assert!(handles.iter().all(|h| h.is_ok()));
    assert_eq!(app.transport.handshakes(&hub), 1);
    assert_eq!(app.manager.ref_count(&hub), 8);
    for handle in handles.iter().flatten() {
        assert_eq!(handle.state(), ConnectionState::Connected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_tabs_same_tick_single_connect() {
    let app = TestApp::new();
    let hub = app.hub();

    let (a, b) = tokio::join!(app.manager.acquire(&hub), app.manager.acquire(&hub));

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(app.transport.handshakes(&hub), 1);
}

#[tokio::test(start_paused = true)]
async fn test_torn_down_once_after_last_release() {
    let app = TestApp::new();
    let hub = app.hub();

    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.push(app.manager.acquire(&hub).await.unwrap());
    }

    // Release out of order; the connection must outlive every release but
    // the last one.
    let last = handles.remove(2);
    for handle in handles {
        handle.release();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(app.manager.state(&hub), ConnectionState::Connected);
        assert_eq!(app.manager.metrics(&hub).teardowns, 0);
    }

    last.release();
    assert_eq!(app.manager.ref_count(&hub), 0);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(app.manager.state(&hub), ConnectionState::Disconnected);
    assert_eq!(app.manager.metrics(&hub).teardowns, 1);
    assert!(!app.transport.is_link_open(&hub));
}

#[tokio::test(start_paused = true)]
async fn test_reacquire_during_grace_cancels_teardown() {
    let app = TestApp::with_grace(Duration::from_millis(250));
    let hub = app.hub();

    let first = app.manager.acquire(&hub).await.unwrap();
    first.release();
    let second = app.manager.acquire(&hub).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(second.state(), ConnectionState::Connected);
    assert_eq!(app.transport.handshakes(&hub), 1);
    assert_eq!(app.manager.metrics(&hub).teardowns, 0);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_after_teardown_reconnects() {
    let app = TestApp::new();
    let hub = app.hub();

    app.manager.acquire(&hub).await.unwrap().release();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(app.manager.state(&hub), ConnectionState::Disconnected);

    let _handle = app.manager.acquire(&hub).await.unwrap();
    assert_eq!(app.transport.handshakes(&hub), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handlers_survive_reconnect() {
    let app = TestApp::new();
    let hub = app.hub();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let _subscription = app.manager.subscribe(&hub, "StudentViewUpdated", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = app.manager.acquire(&hub).await.unwrap();
    app.transport.push(&hub, "StudentViewUpdated", vec![json!(null)]).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    app.transport.drop_link(&hub);
    let mut state = handle.watch_state();
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Reconnecting).await;
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Connected).await;

    app.transport.push(&hub, "StudentViewUpdated", vec![json!(null)]).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(app.manager.subscriber_count(&hub, "StudentViewUpdated"), 1);
    assert_eq!(app.transport.handshakes(&hub), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invoke_while_reconnecting_fails_fast() {
    let app = TestApp::new();
    let hub = app.hub();
    let handle = app.manager.acquire(&hub).await.unwrap();

    app.transport.fail_next_connects(2);
    app.transport.drop_link(&hub);
    let mut state = handle.watch_state();
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Reconnecting).await;

    let err = app
        .manager
        .invoke(&hub, "join-as-student", vec![json!(42)])
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Disconnected));
    assert!(app.transport.invocations().is_empty());

    helpers::wait_until(&mut state, |s| *s == ConnectionState::Connected).await;
    app.manager
        .invoke(&hub, "join-as-student", vec![json!(42)])
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pending_invoke_fails_on_drop() {
    let app = TestApp::new();
    let hub = app.hub();
    app.transport.on_invoke(|_, _, _| InvokeReply::NoReply);
    let _handle = app.manager.acquire(&hub).await.unwrap();

    let manager = app.manager.clone();
    let invoke_hub = hub.clone();
    let pending =
        tokio::spawn(async move { manager.invoke(&invoke_hub, "get-status", vec![]).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    app.transport.drop_link(&hub);

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is(ErrorKind::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn test_invoke_without_connection_fails_not_connected() {
    let app = TestApp::new();
    let hub = app.hub();
    app.transport.fail_next_connects(1);

    let err = app
        .manager
        .invoke(&hub, "join-as-provider", vec![json!(42)])
        .await
        .unwrap_err();

    assert!(err.is(ErrorKind::NotConnected));
    assert_eq!(app.manager.ref_count(&hub), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invoke_implicitly_acquires_for_the_call() {
    let app = TestApp::new();
    let hub = app.hub();
    app.transport
        .on_invoke(|_, target, args| InvokeReply::Ok(json!({ "target": target, "args": args })));

    let reply = app
        .manager
        .invoke(&hub, "join-as-student", vec![json!(42)])
        .await
        .unwrap();

    assert_eq!(reply, json!({ "target": "join-as-student", "args": [42] }));
    assert_eq!(app.manager.ref_count(&hub), 0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(app.manager.state(&hub), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_token_at_every_handshake() {
    let app = TestApp::new();
    let hub = app.hub();
    let handle = app.manager.acquire(&hub).await.unwrap();

    app.tokens.set(Some("token-2".to_string()));
    app.transport.drop_link(&hub);
    let mut state = handle.watch_state();
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Reconnecting).await;
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Connected).await;

    assert_eq!(
        app.transport.tokens_seen(&hub),
        vec![Some("token-1".to_string()), Some("token-2".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnect_returns_to_disconnected() {
    let app = TestApp::new();
    let hub = app.hub();
    let handle = app.manager.acquire(&hub).await.unwrap();

    app.transport.fail_next_connects(100);
    app.transport.drop_link(&hub);
    let mut state = handle.watch_state();
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Reconnecting).await;
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Disconnected).await;

    assert_eq!(app.manager.metrics(&hub).reconnect_attempts, 5);
    assert_eq!(app.manager.ref_count(&hub), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_link_is_dropped_by_keepalive() {
    let app = TestApp::with_connection(ConnectionConfig {
        ping_interval_seconds: 1,
        ping_timeout_seconds: 2,
        ..ConnectionConfig::default()
    });
    let hub = app.hub();
    let handle = app.manager.acquire(&hub).await.unwrap();
    let mut state = handle.watch_state();

    app.transport.mute_pings(true);
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Reconnecting).await;
    app.transport.mute_pings(false);
    helpers::wait_until(&mut state, |s| *s == ConnectionState::Connected).await;

    assert_eq!(app.transport.handshakes(&hub), 2);
    assert_eq!(app.manager.metrics(&hub).reconnect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_answered_pings_keep_link_up() {
    let app = TestApp::with_connection(ConnectionConfig {
        ping_interval_seconds: 1,
        ping_timeout_seconds: 2,
        ..ConnectionConfig::default()
    });
    let hub = app.hub();
    let _handle = app.manager.acquire(&hub).await.unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(app.manager.state(&hub), ConnectionState::Connected);
    assert_eq!(app.transport.handshakes(&hub), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_handshake_times_out() {
    let app = TestApp::with_connection(ConnectionConfig {
        handshake_timeout_seconds: 1,
        ..ConnectionConfig::default()
    });
    let hub = app.hub();
    app.transport.set_connect_delay(Duration::from_secs(3));

    let err = app.manager.acquire(&hub).await.unwrap_err();

    assert!(err.is(ErrorKind::Timeout));
    assert_eq!(app.manager.state(&hub), ConnectionState::Disconnected);
    assert_eq!(app.manager.ref_count(&hub), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_removes_only_its_handler() {
    let app = TestApp::new();
    let hub = app.hub();
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));
    let (ca, cb) = (Arc::clone(&a), Arc::clone(&b));

    let sub_a = app.manager.subscribe(&hub, "ProviderViewUpdated", move |_| {
        ca.fetch_add(1, Ordering::SeqCst);
    });
    let _sub_b = app.manager.subscribe(&hub, "ProviderViewUpdated", move |_| {
        cb.fetch_add(1, Ordering::SeqCst);
    });
    let _handle = app.manager.acquire(&hub).await.unwrap();

    sub_a.dispose();
    app.transport.push(&hub, "ProviderViewUpdated", vec![json!({})]).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(a.load(Ordering::SeqCst), 0);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}
