//! Shared test helpers for integration tests.
//!
//! `TestApp` wires a `HubConnectionManager` to an in-memory transport and a
//! fake office-hours backend that enforces the queue rules and pushes view
//! snapshots over the hub, the way the real backend does.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};
use tokio::sync::watch;

use campus_core::config::ConnectionConfig;
use campus_core::traits::StaticTokenSupplier;
use campus_core::types::{EntryId, SlotId, SubjectId};
use campus_core::{AppError, AppResult};
use campus_officehours::{EntryStatus, OfficeHoursApi, ProviderView, QueueEntry};
use campus_realtime::{HubConnectionManager, HubHandle, MemoryTransport, ReconnectPolicy};

/// Slot used throughout the scenarios.
pub const SLOT: SlotId = SlotId(42);

/// Entry id assigned to the student under test.
pub const MY_ENTRY: EntryId = EntryId(7);

/// Token issued when the student's entry becomes Ready.
pub const QR_TOKEN: &str = "abc";

/// Test application context
pub struct TestApp {
    /// Manager under test
    pub manager: HubConnectionManager,
    /// In-memory hub transport
    pub transport: MemoryTransport,
    /// Fake backend behind the REST seam
    pub backend: Arc<FakeBackend>,
    /// Token supplier consulted at every handshake
    pub tokens: StaticTokenSupplier,
}

impl TestApp {
    /// Create a new test application with a short teardown grace period.
    pub fn new() -> Self {
        Self::with_grace(Duration::from_millis(50))
    }

    /// Create a test application with the given teardown grace period.
    pub fn with_grace(grace: Duration) -> Self {
        Self::with_connection(ConnectionConfig {
            teardown_grace_ms: grace.as_millis() as u64,
            ..ConnectionConfig::default()
        })
    }

    /// Create a test application with explicit connection settings.
    pub fn with_connection(config: ConnectionConfig) -> Self {
        let transport = MemoryTransport::new();
        let tokens = StaticTokenSupplier::new(Some("token-1".to_string()));
        let manager = HubConnectionManager::new(
            Arc::new(transport.clone()),
            Arc::new(tokens.clone()),
            config,
            ReconnectPolicy::fixed(Duration::from_millis(100), 5),
        );
        let backend = Arc::new(FakeBackend::new(transport.clone()));
        Self {
            manager,
            transport,
            backend,
            tokens,
        }
    }

    /// The office-hours hub.
    pub fn hub(&self) -> HubHandle {
        HubHandle::office_hours()
    }

    /// The REST seam as a trait object.
    pub fn api(&self) -> Arc<dyn OfficeHoursApi> {
        self.backend.clone()
    }
}

/// Wait until `rx` satisfies `predicate`, failing the test after 5 seconds.
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("condition not reached in time")
        .expect("watch channel closed");
    value.clone()
}

#[derive(Debug, Default)]
struct SlotState {
    closed: bool,
    next_id: i64,
    waiting: Vec<QueueEntry>,
    current: Option<QueueEntry>,
    finished: Vec<QueueEntry>,
    mine: Option<EntryId>,
}

impl SlotState {
    fn renumber(&mut self) {
        for (i, entry) in self.waiting.iter_mut().enumerate() {
            entry.position = Some(i as u32 + 1);
            entry.estimated_wait_minutes = Some(i as u32 * 10);
        }
    }

    fn find(&self, id: EntryId) -> Option<&QueueEntry> {
        self.waiting
            .iter()
            .chain(self.current.iter())
            .chain(self.finished.iter())
            .find(|e| e.entry_id == id)
    }

    fn my_entry(&self) -> Option<QueueEntry> {
        self.mine.and_then(|id| self.find(id).cloned())
    }

    fn provider_view(&self) -> ProviderView {
        let (token, expires) = match &self.current {
            Some(current) if current.status == EntryStatus::Ready => {
                (current.qr_token.clone(), current.token_expires_at)
            }
            _ => (None, None),
        };
        ProviderView {
            slot_id: Some(SLOT),
            queue: self.waiting.clone(),
            current: self.current.clone(),
            current_qr_token: token,
            current_qr_expires_at: expires,
        }
    }

    fn finish_current(&mut self, status: EntryStatus) {
        if let Some(mut done) = self.current.take() {
            done.status = status;
            done.qr_token = None;
            done.token_expires_at = None;
            self.finished.push(done);
        }
    }
}

/// In-memory office-hours backend.
#[derive(Debug)]
pub struct FakeBackend {
    transport: MemoryTransport,
    state: Mutex<SlotState>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(transport: MemoryTransport) -> Self {
        Self {
            transport,
            state: Mutex::new(SlotState {
                next_id: 1,
                ..SlotState::default()
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add another student's entry to the queue.
    pub fn seed_waiting(&self, id: i64) {
        let mut state = self.state.lock().unwrap();
        let mut entry = QueueEntry::new(EntryId::new(id), EntryStatus::Waiting);
        entry.slot_id = Some(SLOT);
        entry.subject_id = Some(SubjectId::new(100 + id));
        state.waiting.push(entry);
        state.next_id = state.next_id.max(id + 1);
        state.renumber();
    }

    /// Stop accepting joins.
    pub fn close_slot(&self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Names of REST operations called so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    async fn publish(&self) {
        let (mine, view) = {
            let state = self.state.lock().unwrap();
            (state.my_entry(), state.provider_view())
        };
        let hub = HubHandle::office_hours();
        let student = serde_json::to_value(&mine).unwrap();
        let provider = serde_json::to_value(&view).unwrap();
        self.transport
            .push(&hub, "StudentViewUpdated", vec![student])
            .await;
        self.transport
            .push(&hub, "ProviderViewUpdated", vec![provider])
            .await;
    }
}

#[async_trait]
impl OfficeHoursApi for FakeBackend {
    async fn join(&self, _slot: SlotId, metadata: &Value) -> AppResult<Option<QueueEntry>> {
        self.record("join");
        assert!(metadata.is_object(), "metadata must be an object");
        let entry = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(AppError::from_code("SLOT_CLOSED", "Slot is closed"));
            }
            if state
                .my_entry()
                .is_some_and(|e| !e.status.is_terminal())
            {
                return Err(AppError::from_code("ALREADY_QUEUED", "Already in queue"));
            }
            let id = EntryId::new(MY_ENTRY.get().max(state.next_id));
            state.next_id = id.get() + 1;
            let mut entry = QueueEntry::new(id, EntryStatus::Waiting);
            entry.slot_id = Some(SLOT);
            state.waiting.push(entry);
            state.mine = Some(id);
            state.renumber();
            state.my_entry()
        };
        self.publish().await;
        Ok(entry)
    }

    async fn status(&self, _slot: SlotId) -> AppResult<Option<QueueEntry>> {
        self.record("status");
        Ok(self.state.lock().unwrap().my_entry())
    }

    async fn check_in(&self, _slot: SlotId, token: &str) -> AppResult<Option<QueueEntry>> {
        self.record("check_in");
        let entry = {
            let mut state = self.state.lock().unwrap();
            let mine = state.mine;
            let Some(current) = state.current.as_mut().filter(|c| Some(c.entry_id) == mine)
            else {
                return Err(AppError::from_code("INVALID_TOKEN", "No ready session"));
            };
            let valid = current.status == EntryStatus::Ready
                && current.qr_token.as_deref() == Some(token)
                && current.token_expires_at.is_some_and(|t| t > Utc::now());
            if !valid {
                return Err(AppError::from_code("INVALID_TOKEN", "Token rejected"));
            }
            current.status = EntryStatus::InProgress;
            current.qr_token = None;
            current.token_expires_at = None;
            state.my_entry()
        };
        self.publish().await;
        Ok(entry)
    }

    async fn provider_view(&self, _slot: SlotId) -> AppResult<ProviderView> {
        self.record("provider_view");
        Ok(self.state.lock().unwrap().provider_view())
    }

    async fn call_next(&self, _slot: SlotId) -> AppResult<()> {
        self.record("call_next");
        {
            let mut state = self.state.lock().unwrap();
            if state
                .current
                .as_ref()
                .is_some_and(|c| c.status.is_servicing())
            {
                return Err(AppError::from_code("ALREADY_SERVICING", "Busy"));
            }
            if state.waiting.is_empty() {
                return Err(AppError::from_code("NO_ONE_WAITING", "Empty queue"));
            }
            let mut next = state.waiting.remove(0);
            next.status = EntryStatus::Ready;
            next.position = None;
            next.estimated_wait_minutes = None;
            next.qr_token = Some(QR_TOKEN.to_string());
            next.token_expires_at = Some(Utc::now() + TimeDelta::seconds(120));
            state.current = Some(next);
            state.renumber();
        }
        self.publish().await;
        Ok(())
    }

    async fn complete_current(&self, _slot: SlotId) -> AppResult<()> {
        self.record("complete_current");
        {
            let mut state = self.state.lock().unwrap();
            if state.current.as_ref().map(|c| c.status) != Some(EntryStatus::InProgress) {
                return Err(AppError::from_code("INVALID_STATE", "Not in progress"));
            }
            state.finish_current(EntryStatus::Done);
        }
        self.publish().await;
        Ok(())
    }

    async fn mark_no_show(&self, _slot: SlotId) -> AppResult<()> {
        self.record("mark_no_show");
        {
            let mut state = self.state.lock().unwrap();
            if state.current.as_ref().map(|c| c.status) != Some(EntryStatus::Ready) {
                return Err(AppError::from_code("INVALID_STATE", "Not ready"));
            }
            state.finish_current(EntryStatus::NoShow);
        }
        self.publish().await;
        Ok(())
    }
}

/// Join metadata used by the scenarios.
pub fn office_hours_metadata() -> Value {
    json!({ "purpose": "office hours" })
}
