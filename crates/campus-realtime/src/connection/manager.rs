//! Hub connection manager: one ref-counted push connection per hub.
//!
//! Every hub handle owns a [`HubSlot`] holding its lifecycle under a single
//! lock. Acquire, release, teardown and session installation all mutate the
//! lifecycle under that lock, so the state machine observed by callers is
//! linearizable even though the session itself runs on a spawned task.
//!
//! Sessions are numbered. A teardown bumps the number, which makes any
//! session still in flight stale: it drops its link instead of installing it.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use campus_core::config::{AppConfig, ConnectionConfig};
use campus_core::traits::TokenSupplier;
use campus_core::{AppError, AppResult, ErrorKind};

use crate::channel::{EventHandler, HandlerRegistry, Subscription};
use crate::hub::HubHandle;
use crate::message::{ClientFrame, ServerFrame};
use crate::metrics::{HubMetrics, HubMetricsSnapshot};
use crate::transport::{HubTransport, TransportLink, WebSocketTransport};

use super::handle::ConnectionHandle;
use super::heartbeat::Keepalive;
use super::policy::ReconnectPolicy;
use super::state::ConnectionState;

/// The single pending connect result shared by concurrent acquirers.
type ConnectFuture = Shared<BoxFuture<'static, AppResult<()>>>;

type PendingInvokes = DashMap<String, oneshot::Sender<AppResult<Value>>>;

/// Removes an invocation from the pending table once its caller stops
/// waiting, whether it got an answer, timed out or was dropped.
struct PendingGuard<'a> {
    pending: &'a PendingInvokes,
    invocation_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.invocation_id);
    }
}

/// Everything a session task needs. Holds no reference back to the hub map.
#[derive(Debug)]
struct SessionContext {
    transport: Arc<dyn HubTransport>,
    tokens: Arc<dyn TokenSupplier>,
    policy: ReconnectPolicy,
    config: ConnectionConfig,
}

#[derive(Debug)]
struct ManagerInner {
    ctx: Arc<SessionContext>,
    hubs: DashMap<HubHandle, Arc<HubSlot>>,
}

/// Mutable lifecycle of one hub, guarded by [`HubSlot::lifecycle`].
#[derive(Default)]
struct Lifecycle {
    /// Outstanding acquisitions.
    ref_count: usize,
    /// Bumped by every acquire; a scheduled teardown only runs if unchanged.
    epoch: u64,
    /// Current session number; stale sessions never install their link.
    session: u64,
    /// In-flight initial connect, shared by concurrent acquirers.
    connect: Option<ConnectFuture>,
    /// Sender side of the live link.
    outbound: Option<mpsc::Sender<ClientFrame>>,
    /// Session task (handshake, frame loop, reconnects).
    driver: Option<JoinHandle<()>>,
    /// Scheduled teardown after the last release.
    teardown: Option<JoinHandle<()>>,
}

/// Per-hub connection slot.
struct HubSlot {
    hub: HubHandle,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<ConnectionState>,
    /// Links established so far; bumped by every install, reconnects included.
    links_tx: watch::Sender<u64>,
    /// Owned by the slot, not by a link, so handlers survive reconnects.
    handlers: Arc<HandlerRegistry>,
    pending: PendingInvokes,
    metrics: HubMetrics,
}

impl std::fmt::Debug for HubSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSlot")
            .field("hub", &self.hub)
            .field("state", &*self.state_tx.borrow())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl HubSlot {
    fn new(hub: HubHandle) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (links_tx, _) = watch::channel(0);
        Self {
            hub,
            lifecycle: Mutex::new(Lifecycle::default()),
            state_tx,
            links_tx,
            handlers: Arc::new(HandlerRegistry::new()),
            pending: DashMap::new(),
            metrics: HubMetrics::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(hub = %self.hub, from = %previous, to = %state, "Hub state changed");
        }
    }

    fn fail_pending(&self, error: &AppError) {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                self.metrics.record_invoke_failure();
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    /// Install an established link if `session` is still current.
    fn install(&self, session: u64, link: TransportLink) -> Option<mpsc::Receiver<ServerFrame>> {
        let mut life = self.lock();
        if life.session != session {
            debug!(hub = %self.hub, session, "Dropping link of a stale session");
            return None;
        }
        life.outbound = Some(link.outbound);
        life.connect = None;
        self.set_state(ConnectionState::Connected);
        self.links_tx.send_modify(|links| *links += 1);
        Some(link.inbound)
    }

    /// The initial handshake failed; return to `Disconnected`.
    fn abandon_connect(&self, session: u64) {
        let mut life = self.lock();
        if life.session != session {
            return;
        }
        life.connect = None;
        life.driver = None;
        life.outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// An established link dropped; fail in-flight invokes and enter
    /// `Reconnecting`. Returns `false` if the session is stale.
    fn begin_reconnect(&self, session: u64) -> bool {
        let mut life = self.lock();
        if life.session != session {
            return false;
        }
        life.outbound = None;
        self.set_state(ConnectionState::Reconnecting);
        drop(life);
        self.fail_pending(&AppError::disconnected(format!(
            "Hub '{}' connection dropped",
            self.hub
        )));
        true
    }

    /// Reconnect attempts are exhausted (or disabled).
    fn give_up(&self, session: u64) {
        let mut life = self.lock();
        if life.session != session {
            return;
        }
        life.driver = None;
        life.outbound = None;
        life.connect = None;
        self.set_state(ConnectionState::Disconnected);
        drop(life);
        self.fail_pending(&AppError::disconnected(format!(
            "Hub '{}' could not be reconnected",
            self.hub
        )));
    }

    fn outbound(&self) -> Option<mpsc::Sender<ClientFrame>> {
        self.lock().outbound.clone()
    }

    /// Close the connection unconditionally. Caller holds the lock.
    fn teardown_locked(&self, life: &mut Lifecycle) {
        life.session += 1;
        life.epoch += 1;
        let existed = life.driver.is_some() || life.outbound.is_some();
        if let Some(driver) = life.driver.take() {
            driver.abort();
        }
        if let Some(teardown) = life.teardown.take() {
            teardown.abort();
        }
        life.outbound = None;
        life.connect = None;
        self.set_state(ConnectionState::Disconnected);
        self.fail_pending(&AppError::disconnected(format!(
            "Hub '{}' connection closed",
            self.hub
        )));
        if existed {
            self.metrics.record_teardown();
            info!(hub = %self.hub, "Hub connection torn down");
        }
    }

    /// Scheduled teardown: runs only if no acquire happened since `epoch`.
    fn teardown_if_idle(&self, epoch: u64) {
        let mut life = self.lock();
        if life.epoch != epoch || life.ref_count > 0 {
            trace!(hub = %self.hub, "Scheduled teardown superseded");
            return;
        }
        // Our own handle; detach instead of aborting ourselves.
        life.teardown = None;
        self.teardown_locked(&mut life);
    }

    /// Route one inbound frame. Returns `false` when the server closed the link.
    fn handle_frame(&self, frame: ServerFrame) -> bool {
        match frame {
            ServerFrame::Event { target, arguments } => {
                let delivered = self.handlers.dispatch(&target, &arguments);
                if delivered > 0 {
                    self.metrics.record_event();
                }
                trace!(hub = %self.hub, event = %target, delivered, "Hub event dispatched");
                true
            }
            ServerFrame::Completion {
                invocation_id,
                result,
                error,
            } => {
                match self.pending.remove(&invocation_id) {
                    Some((_, tx)) => {
                        let outcome = match error {
                            Some(detail) => {
                                self.metrics.record_invoke_failure();
                                Err(AppError::from(detail))
                            }
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        debug!(hub = %self.hub, invocation_id = %invocation_id, "Completion for unknown invocation");
                    }
                }
                true
            }
            ServerFrame::Ping => true,
            ServerFrame::Close { reason } => {
                info!(hub = %self.hub, reason = ?reason, "Hub closed the connection");
                false
            }
        }
    }
}

/// Process-wide hub connection manager.
///
/// Cheap to clone; all clones share the same connections. For any hub
/// handle there is at most one live connection and at most one handshake in
/// flight, no matter how many callers acquire it concurrently.
#[derive(Debug, Clone)]
pub struct HubConnectionManager {
    inner: Arc<ManagerInner>,
}

impl HubConnectionManager {
    /// Create a manager over an explicit transport.
    pub fn new(
        transport: Arc<dyn HubTransport>,
        tokens: Arc<dyn TokenSupplier>,
        config: ConnectionConfig,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                ctx: Arc::new(SessionContext {
                    transport,
                    tokens,
                    policy,
                    config,
                }),
                hubs: DashMap::new(),
            }),
        }
    }

    /// Create a WebSocket-backed manager from application configuration.
    pub fn from_config(config: &AppConfig, tokens: Arc<dyn TokenSupplier>) -> Self {
        let transport =
            WebSocketTransport::new(config.hubs.clone(), config.connection.channel_buffer_size);
        Self::new(
            Arc::new(transport),
            tokens,
            config.connection.clone(),
            ReconnectPolicy::from(&config.reconnect),
        )
    }

    /// The reconnect policy in effect.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.ctx.policy
    }

    fn slot(&self, hub: &HubHandle) -> Arc<HubSlot> {
        if let Some(slot) = self.inner.hubs.get(hub) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.inner
                .hubs
                .entry(hub.clone())
                .or_insert_with(|| Arc::new(HubSlot::new(hub.clone())))
                .value(),
        )
    }

    fn existing_slot(&self, hub: &HubHandle) -> Option<Arc<HubSlot>> {
        self.inner.hubs.get(hub).map(|s| Arc::clone(s.value()))
    }

    /// Acquire a reference to the hub connection, connecting if needed.
    ///
    /// Concurrent acquires while a handshake is in flight all await the same
    /// pending result. An acquire arriving during the teardown grace period
    /// cancels the teardown and reuses the connection. If the handshake
    /// fails (or this future is dropped), the acquired reference is released.
    pub async fn acquire(&self, hub: &HubHandle) -> AppResult<ConnectionHandle> {
        let slot = self.slot(hub);
        let pending = {
            let mut life = slot.lock();
            life.ref_count += 1;
            life.epoch += 1;
            if let Some(teardown) = life.teardown.take() {
                teardown.abort();
                debug!(hub = %hub, "Pending teardown cancelled by acquire");
            }
            match slot.state() {
                ConnectionState::Connected | ConnectionState::Reconnecting => None,
                ConnectionState::Connecting if life.connect.is_some() => life.connect.clone(),
                _ => Some(self.start_session(&slot, &mut life)),
            }
        };

        let handle = ConnectionHandle::new(self.clone(), hub.clone(), slot.state_tx.subscribe());
        if let Some(connect) = pending {
            connect.await?;
        }
        Ok(handle)
    }

    fn start_session(&self, slot: &Arc<HubSlot>, life: &mut Lifecycle) -> ConnectFuture {
        life.session += 1;
        let session = life.session;
        let (ready_tx, ready_rx) = oneshot::channel::<AppResult<()>>();
        let hub = slot.hub.clone();
        let connect: ConnectFuture = async move {
            match ready_rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(AppError::not_connected(format!(
                    "Connect attempt for hub '{hub}' was abandoned"
                ))),
            }
        }
        .boxed()
        .shared();

        life.connect = Some(connect.clone());
        slot.set_state(ConnectionState::Connecting);
        life.driver = Some(tokio::spawn(run_session(
            Arc::clone(&self.inner.ctx),
            Arc::clone(slot),
            session,
            ready_tx,
        )));
        connect
    }

    /// Release one reference. Never drops below zero.
    ///
    /// At zero a teardown is scheduled after the configured grace period; an
    /// acquire before it fires cancels it.
    pub fn release(&self, hub: &HubHandle) {
        let Some(slot) = self.existing_slot(hub) else {
            warn!(hub = %hub, "Release for a hub that was never acquired");
            return;
        };
        let mut life = slot.lock();
        if life.ref_count == 0 {
            warn!(hub = %hub, "Release without matching acquire ignored");
            return;
        }
        life.ref_count -= 1;
        if life.ref_count > 0 {
            return;
        }

        let epoch = life.epoch;
        let grace = self.inner.ctx.config.teardown_grace();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task_slot = Arc::clone(&slot);
                debug!(hub = %hub, grace_ms = grace.as_millis() as u64, "Teardown scheduled");
                life.teardown = Some(runtime.spawn(async move {
                    time::sleep(grace).await;
                    task_slot.teardown_if_idle(epoch);
                }));
            }
            Err(_) => slot.teardown_locked(&mut life),
        }
    }

    /// Register a handler for a pushed event.
    ///
    /// The handler stays attached across reconnects until the returned
    /// subscription is disposed.
    pub fn subscribe<F>(&self, hub: &HubHandle, event: &str, handler: F) -> Subscription
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let slot = self.slot(hub);
        let handler: EventHandler = Arc::new(handler);
        let id = slot.handlers.subscribe(event, handler);
        debug!(hub = %hub, event = %event, id, "Subscribed");
        Subscription::new(
            hub.clone(),
            event.to_string(),
            id,
            Arc::downgrade(&slot.handlers),
        )
    }

    /// Register a handler receiving the first event argument decoded as `T`.
    ///
    /// Payloads that fail to decode are logged and skipped.
    pub fn subscribe_typed<T, F>(&self, hub: &HubHandle, event: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let hub_name = hub.clone();
        let event_name = event.to_string();
        self.subscribe(hub, event, move |args| {
            let payload = args.first().cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<T>(payload) {
                Ok(value) => handler(value),
                Err(e) => {
                    warn!(hub = %hub_name, event = %event_name, error = %e, "Undecodable event payload");
                }
            }
        })
    }

    /// Call a hub method and await the server's reply.
    ///
    /// While `Reconnecting` this fails fast with `Disconnected`. When no
    /// connection exists the hub is acquired for the duration of the call;
    /// if that handshake fails the error is `NotConnected`.
    pub async fn invoke(
        &self,
        hub: &HubHandle,
        method: &str,
        arguments: Vec<Value>,
    ) -> AppResult<Value> {
        let slot = self.slot(hub);
        let _scope = match slot.state() {
            ConnectionState::Connected => None,
            ConnectionState::Reconnecting => {
                return Err(AppError::disconnected(format!(
                    "Hub '{hub}' is reconnecting; '{method}' was not sent"
                )));
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                let handle = self.acquire(hub).await.map_err(|e| {
                    if e.is(ErrorKind::Authentication) {
                        e
                    } else {
                        AppError::not_connected(format!(
                            "Hub '{hub}' is not connected ({}); '{method}' was not sent",
                            e.message
                        ))
                    }
                })?;
                Some(handle)
            }
        };

        let Some(outbound) = slot.outbound() else {
            return Err(AppError::disconnected(format!(
                "Hub '{hub}' lost its connection before '{method}' was sent"
            )));
        };

        let invocation_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        slot.pending.insert(invocation_id.clone(), tx);
        let _pending = PendingGuard {
            pending: &slot.pending,
            invocation_id: invocation_id.clone(),
        };

        let frame = ClientFrame::Invoke {
            invocation_id: invocation_id.clone(),
            target: method.to_string(),
            arguments,
        };
        if outbound.send(frame).await.is_err() {
            slot.metrics.record_invoke_failure();
            return Err(AppError::disconnected(format!(
                "Hub '{hub}' link closed while sending '{method}'"
            )));
        }
        slot.metrics.record_invoke();
        trace!(hub = %hub, method = %method, invocation_id = %invocation_id, "Invoke sent");

        match time::timeout(self.inner.ctx.config.invoke_timeout(), rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AppError::disconnected(format!(
                "Hub '{hub}' closed before answering '{method}'"
            ))),
            Err(_) => {
                slot.metrics.record_invoke_failure();
                Err(AppError::timeout(format!(
                    "Hub '{hub}' did not answer '{method}' in time"
                )))
            }
        }
    }

    /// Current connection state of a hub.
    pub fn state(&self, hub: &HubHandle) -> ConnectionState {
        self.existing_slot(hub)
            .map(|s| s.state())
            .unwrap_or_default()
    }

    /// Watch state transitions of a hub.
    pub fn watch_state(&self, hub: &HubHandle) -> watch::Receiver<ConnectionState> {
        self.slot(hub).state_tx.subscribe()
    }

    /// Watch the number of links established for a hub.
    ///
    /// The value changes after every successful handshake, including each
    /// reconnect. Server-side state tied to the old link (push-group
    /// membership, events sent during the gap) is gone by then, so holders
    /// of a hub re-join and re-fetch when it changes.
    pub fn watch_links(&self, hub: &HubHandle) -> watch::Receiver<u64> {
        self.slot(hub).links_tx.subscribe()
    }

    /// Invocations awaiting a reply on a hub.
    pub fn pending_invokes(&self, hub: &HubHandle) -> usize {
        self.existing_slot(hub)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    /// Outstanding acquisitions of a hub.
    pub fn ref_count(&self, hub: &HubHandle) -> usize {
        self.existing_slot(hub)
            .map(|s| s.lock().ref_count)
            .unwrap_or(0)
    }

    /// Number of handlers registered for `event` on `hub`.
    pub fn subscriber_count(&self, hub: &HubHandle, event: &str) -> usize {
        self.existing_slot(hub)
            .map(|s| s.handlers.subscriber_count(event))
            .unwrap_or(0)
    }

    /// Lifecycle counters for a hub.
    pub fn metrics(&self, hub: &HubHandle) -> HubMetricsSnapshot {
        self.existing_slot(hub)
            .map(|s| s.metrics.snapshot())
            .unwrap_or_default()
    }

    /// Tear down every hub immediately, regardless of reference counts.
    pub fn shutdown(&self) {
        for entry in self.inner.hubs.iter() {
            let slot = entry.value();
            let mut life = slot.lock();
            life.ref_count = 0;
            slot.teardown_locked(&mut life);
        }
        info!("Hub connection manager shut down");
    }
}

/// One handshake: fresh token, then the transport connect under a deadline.
async fn handshake(ctx: &SessionContext, slot: &HubSlot) -> AppResult<TransportLink> {
    let bearer = ctx.tokens.bearer_token().await?;
    slot.metrics.record_handshake();
    debug!(hub = %slot.hub, authenticated = bearer.is_some(), "Hub handshake started");
    match time::timeout(
        ctx.config.handshake_timeout(),
        ctx.transport.connect(&slot.hub, bearer),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AppError::timeout(format!(
            "Handshake with hub '{}' timed out",
            slot.hub
        ))),
    }
}

/// Session task: initial handshake, frame loop, and reconnects.
async fn run_session(
    ctx: Arc<SessionContext>,
    slot: Arc<HubSlot>,
    session: u64,
    ready: oneshot::Sender<AppResult<()>>,
) {
    let link = match handshake(&ctx, &slot).await {
        Ok(link) => link,
        Err(e) => {
            warn!(hub = %slot.hub, error = %e, "Hub handshake failed");
            slot.abandon_connect(session);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let Some(mut inbound) = slot.install(session, link) else {
        let _ = ready.send(Err(AppError::not_connected(format!(
            "Connect attempt for hub '{}' was superseded",
            slot.hub
        ))));
        return;
    };
    info!(hub = %slot.hub, "Hub connected");
    let _ = ready.send(Ok(()));

    loop {
        let reason = drive_link(&ctx, &slot, &mut inbound).await;
        warn!(hub = %slot.hub, reason, "Hub link dropped");

        if !slot.begin_reconnect(session) {
            return;
        }
        match reconnect(&ctx, &slot, session).await {
            Some(next) => {
                info!(hub = %slot.hub, "Hub reconnected");
                inbound = next;
            }
            None => {
                error!(hub = %slot.hub, "Hub reconnect attempts exhausted");
                slot.give_up(session);
                return;
            }
        }
    }
}

/// Pump frames until the link drops. Returns the reason.
async fn drive_link(
    ctx: &SessionContext,
    slot: &HubSlot,
    inbound: &mut mpsc::Receiver<ServerFrame>,
) -> &'static str {
    let mut keepalive = Keepalive::new(ctx.config.ping_interval(), ctx.config.ping_timeout());
    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(frame) => {
                    keepalive.observe();
                    if !slot.handle_frame(frame) {
                        return "closed by server";
                    }
                }
                None => return "transport closed",
            },
            _ = keepalive.tick() => {
                if keepalive.is_expired() {
                    debug!(hub = %slot.hub, silence_ms = keepalive.silence().as_millis() as u64, "Keepalive expired");
                    return "keepalive timeout";
                }
                match slot.outbound() {
                    Some(outbound) => {
                        if let Err(mpsc::error::TrySendError::Closed(_)) = outbound.try_send(ClientFrame::Ping) {
                            return "transport closed";
                        }
                    }
                    None => return "transport closed",
                }
            }
        }
    }
}

/// Retry handshakes per the reconnect policy.
async fn reconnect(
    ctx: &SessionContext,
    slot: &HubSlot,
    session: u64,
) -> Option<mpsc::Receiver<ServerFrame>> {
    let mut attempt = 0;
    while let Some(delay) = ctx.policy.delay_for(attempt) {
        attempt += 1;
        slot.metrics.record_reconnect_attempt();
        debug!(hub = %slot.hub, attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        time::sleep(delay).await;

        match handshake(ctx, slot).await {
            Ok(link) => return slot.install(session, link),
            Err(e) => warn!(hub = %slot.hub, attempt, error = %e, "Reconnect attempt failed"),
        }
    }
    None
}
