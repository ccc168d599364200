//! End-to-end office-hours queue scenarios.

mod helpers;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use campus_core::config::PresenceConfig;
use campus_core::types::SlotId;
use campus_core::{AppError, AppResult, ErrorKind};
use campus_realtime::ConnectionState;
use campus_officehours::{
    Camera, EntryStatus, Frame, PresenceOutcome, ProofOfPresenceFlow, ProviderClient,
    QrDecoder, QueueClient, TokenSource, VideoStream,
};

use helpers::{MY_ENTRY, QR_TOKEN, SLOT, TestApp, office_hours_metadata, wait_until};

async fn student(app: &TestApp) -> QueueClient {
    QueueClient::attach(&app.manager, app.api(), SLOT)
        .await
        .unwrap()
}

async fn provider(app: &TestApp) -> ProviderClient {
    ProviderClient::attach(&app.manager, app.api(), SLOT)
        .await
        .unwrap()
}

/// Join behind two others and get called after both are marked no-show.
async fn reach_ready(app: &TestApp, student: &QueueClient, provider: &ProviderClient) {
    app.backend.seed_waiting(5);
    app.backend.seed_waiting(6);
    student.join(office_hours_metadata()).await.unwrap();

    for _ in 0..2 {
        provider.call_next().await.unwrap();
        provider.mark_no_show().await.unwrap();
    }
    provider.call_next().await.unwrap();

    let mut view = student.watch();
    wait_until(&mut view, |v| v.status() == Some(EntryStatus::Ready)).await;
}

#[tokio::test(start_paused = true)]
async fn test_student_flow_from_join_to_done() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;

    app.backend.seed_waiting(5);
    app.backend.seed_waiting(6);
    student.join(office_hours_metadata()).await.unwrap();

    let entry = student.entry().unwrap();
    assert_eq!(entry.entry_id, MY_ENTRY);
    assert_eq!(entry.status, EntryStatus::Waiting);
    assert_eq!(entry.position, Some(3));

    for _ in 0..2 {
        provider.call_next().await.unwrap();
        provider.mark_no_show().await.unwrap();
    }
    provider.call_next().await.unwrap();

    let mut view = student.watch();
    let ready = wait_until(&mut view, |v| v.status() == Some(EntryStatus::Ready)).await;
    let session = ready.ready_session().unwrap();
    assert_eq!(session.entry_id, MY_ENTRY);
    assert_eq!(session.qr_token, QR_TOKEN);

    student.check_in(QR_TOKEN).await.unwrap();
    assert_eq!(student.view().status(), Some(EntryStatus::InProgress));
    assert!(student.ready_session().is_none());

    let mut provider_view = provider.watch();
    wait_until(&mut provider_view, |v| {
        v.current_status() == Some(EntryStatus::InProgress)
    })
    .await;
    provider.complete_current().await.unwrap();

    let done = wait_until(&mut view, |v| v.status() == Some(EntryStatus::Done)).await;
    assert_eq!(done.entry().unwrap().entry_id, MY_ENTRY);
    assert_eq!(app.transport.handshakes(&app.hub()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_complete_while_ready_is_rejected_locally() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;
    reach_ready(&app, &student, &provider).await;

    let before = provider.get_view().await.unwrap();
    let err = provider.complete_current().await.unwrap_err();

    assert!(err.is(ErrorKind::InvalidState));
    assert_eq!(provider.view(), before);
    assert!(!app.backend.calls().contains(&"complete_current".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_call_next_while_servicing_is_rejected() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;
    reach_ready(&app, &student, &provider).await;

    let err = provider.call_next().await.unwrap_err();

    assert!(err.is(ErrorKind::AlreadyServicing));
    assert_eq!(student.view().status(), Some(EntryStatus::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_call_next_on_empty_queue() {
    let app = TestApp::new();
    let provider = provider(&app).await;

    let err = provider.call_next().await.unwrap_err();

    assert!(err.is(ErrorKind::NoOneWaiting));
    assert!(!app.backend.calls().contains(&"call_next".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_join_twice_refetches_and_fails() {
    let app = TestApp::new();
    let student = student(&app).await;
    student.join(office_hours_metadata()).await.unwrap();
    let status_calls = count(&app.backend.calls(), "status");

    let err = student.join(office_hours_metadata()).await.unwrap_err();

    assert!(err.is(ErrorKind::AlreadyQueued));
    assert_eq!(count(&app.backend.calls(), "status"), status_calls + 1);
    assert_eq!(student.view().status(), Some(EntryStatus::Waiting));
}

#[tokio::test(start_paused = true)]
async fn test_join_closed_slot() {
    let app = TestApp::new();
    let student = student(&app).await;
    app.backend.close_slot();

    let err = student.join(office_hours_metadata()).await.unwrap_err();

    assert!(err.is(ErrorKind::SlotClosed));
    assert!(student.entry().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_wrong_token_is_rejected() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;
    reach_ready(&app, &student, &provider).await;

    let err = student.check_in("wrong").await.unwrap_err();

    assert!(err.is(ErrorKind::InvalidOrExpiredToken));
    assert_eq!(student.view().status(), Some(EntryStatus::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_empty_token_never_reaches_backend() {
    let app = TestApp::new();
    let student = student(&app).await;

    let err = student.check_in("   ").await.unwrap_err();

    assert!(err.is(ErrorKind::InvalidOrExpiredToken));
    assert!(!app.backend.calls().contains(&"check_in".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_two_clients_attached_together_share_connection() {
    let app = TestApp::new();

    let (student, provider) = tokio::join!(
        QueueClient::attach(&app.manager, app.api(), SLOT),
        ProviderClient::attach(&app.manager, app.api(), SLOT),
    );
    let (mut student, mut provider) = (student.unwrap(), provider.unwrap());

    assert_eq!(app.transport.handshakes(&app.hub()), 1);
    assert_eq!(app.manager.ref_count(&app.hub()), 2);

    student.detach();
    provider.detach();
    assert_eq!(app.manager.ref_count(&app.hub()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_attach_joins_push_groups() {
    let app = TestApp::new();
    let _student = student(&app).await;
    let _provider = provider(&app).await;

    let targets: Vec<String> = app
        .transport
        .invocations()
        .into_iter()
        .map(|i| i.target)
        .collect();
    assert_eq!(targets, vec!["join-as-student", "join-as-provider"]);
    assert!(
        app.transport
            .invocations()
            .iter()
            .all(|i| i.arguments == vec![serde_json::json!(SLOT.get())])
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_rejoins_and_catches_up() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;
    student.join(office_hours_metadata()).await.unwrap();
    let mut provider_view = provider.watch();
    wait_until(&mut provider_view, |v| v.waiting().count() == 1).await;

    let mut state = app.manager.watch_state(&app.hub());
    app.transport.drop_link(&app.hub());
    wait_until(&mut state, |s| *s == ConnectionState::Reconnecting).await;

    // Promoted while the hub is down: the push is lost.
    provider.call_next().await.unwrap();

    let mut view = student.watch();
    let ready = wait_until(&mut view, |v| v.status() == Some(EntryStatus::Ready)).await;
    assert_eq!(ready.ready_session().unwrap().qr_token, QR_TOKEN);
    wait_until(&mut provider_view, |v| {
        v.current_status() == Some(EntryStatus::Ready)
    })
    .await;

    let joins = |target: &str| {
        app.transport
            .invocations()
            .iter()
            .filter(|i| i.target == target)
            .count()
    };
    assert_eq!(joins("join-as-student"), 2);
    assert_eq!(joins("join-as-provider"), 2);
    assert_eq!(app.manager.state(&app.hub()), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_detached_client_does_not_rejoin() {
    let app = TestApp::new();
    let mut student = student(&app).await;
    let _provider = provider(&app).await;
    student.detach();

    let mut links = app.manager.watch_links(&app.hub());
    app.transport.drop_link(&app.hub());
    links.changed().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let targets: Vec<String> = app
        .transport
        .invocations()
        .into_iter()
        .map(|i| i.target)
        .collect();
    assert_eq!(
        targets,
        vec!["join-as-student", "join-as-provider", "join-as-provider"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_provider_ignores_other_slot_pushes() {
    let app = TestApp::new();
    let mine = provider(&app).await;
    let other = ProviderClient::attach(&app.manager, app.api(), SlotId::new(43))
        .await
        .unwrap();

    app.transport
        .push(
            &app.hub(),
            "ProviderViewUpdated",
            vec![json!({
                "slotId": SLOT.get(),
                "queue": [{ "entryId": 5, "slotId": SLOT.get(), "status": "Waiting" }]
            })],
        )
        .await;
    let mut view = mine.watch();
    wait_until(&mut view, |v| v.queue.len() == 1).await;

    assert!(other.view().queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scanned_token_checks_in() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;
    reach_ready(&app, &student, &provider).await;

    let stopped = Arc::new(Mutex::new(false));
    let camera: Arc<dyn Camera> = Arc::new(StaticCamera {
        stopped: Arc::clone(&stopped),
    });
    let flow = ProofOfPresenceFlow::new(
        Some(camera),
        Some(Arc::new(PayloadDecoder)),
        Arc::new(student.check_in_handle()),
        &PresenceConfig::default(),
    );

    let outcome = flow.scan(student.watch()).await;

    assert!(matches!(
        outcome,
        PresenceOutcome::CheckedIn(TokenSource::Scanned)
    ));
    assert!(*stopped.lock().unwrap());
    assert_eq!(student.view().status(), Some(EntryStatus::InProgress));
}

#[tokio::test(start_paused = true)]
async fn test_manual_entry_after_camera_denied() {
    let app = TestApp::new();
    let student = student(&app).await;
    let provider = provider(&app).await;
    reach_ready(&app, &student, &provider).await;

    let flow = ProofOfPresenceFlow::new(
        Some(Arc::new(DeniedCamera)),
        Some(Arc::new(PayloadDecoder)),
        Arc::new(student.check_in_handle()),
        &PresenceConfig::default(),
    );

    let outcome = flow.scan(student.watch()).await;
    assert!(matches!(outcome, PresenceOutcome::ManualEntryRequired(_)));

    let rejected = flow.submit_manual("nope").await;
    assert!(matches!(rejected, PresenceOutcome::TokenRejected(_)));

    let accepted = flow.submit_manual(QR_TOKEN).await;
    assert!(matches!(
        accepted,
        PresenceOutcome::CheckedIn(TokenSource::Typed)
    ));
    assert_eq!(
        student.entry().map(|e| (e.entry_id, e.status)),
        Some((MY_ENTRY, EntryStatus::InProgress))
    );
}

fn count(calls: &[String], name: &str) -> usize {
    calls.iter().filter(|c| *c == name).count()
}

#[derive(Debug)]
struct StaticCamera {
    stopped: Arc<Mutex<bool>>,
}

struct StaticStream {
    stopped: Arc<Mutex<bool>>,
}

impl VideoStream for StaticStream {
    fn capture(&mut self) -> AppResult<Option<Frame>> {
        Ok(Some(Frame {
            width: 1,
            height: 1,
            luma: QR_TOKEN.as_bytes().to_vec(),
        }))
    }

    fn stop(&mut self) {
        *self.stopped.lock().unwrap() = true;
    }
}

#[async_trait]
impl Camera for StaticCamera {
    async fn open(&self) -> AppResult<Box<dyn VideoStream>> {
        Ok(Box::new(StaticStream {
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

#[derive(Debug)]
struct DeniedCamera;

#[async_trait]
impl Camera for DeniedCamera {
    async fn open(&self) -> AppResult<Box<dyn VideoStream>> {
        Err(AppError::camera_denied("Permission denied by user"))
    }
}

/// Treats the frame's bytes as the QR payload.
#[derive(Debug)]
struct PayloadDecoder;

impl QrDecoder for PayloadDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        String::from_utf8(frame.luma.clone()).ok()
    }
}
