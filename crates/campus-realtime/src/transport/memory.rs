//! In-memory transport for single-process use and tests.
//!
//! Each handshake creates a link whose server side is driven by a small
//! task: invocations are answered by a configurable responder and pings are
//! echoed. Pushes and link drops are issued through the transport handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use campus_core::{AppError, AppResult};

use crate::hub::HubHandle;
use crate::message::{ClientFrame, ServerFrame};

use super::{HubTransport, TransportLink};

/// How the in-memory server answers one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeReply {
    /// Successful completion with a result.
    Ok(Value),
    /// Failed completion with a backend error code and message.
    Err(String, String),
    /// Never answer (exercise invoke timeouts).
    NoReply,
}

type Responder = Arc<dyn Fn(&HubHandle, &str, &[Value]) -> InvokeReply + Send + Sync>;

/// A recorded client invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInvoke {
    /// Hub the invocation was sent on.
    pub hub: HubHandle,
    /// Method name.
    pub target: String,
    /// Arguments.
    pub arguments: Vec<Value>,
}

struct ServerEnd {
    to_client: mpsc::Sender<ServerFrame>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct MemoryState {
    handshakes: HashMap<HubHandle, u64>,
    tokens: Vec<(HubHandle, Option<String>)>,
    links: HashMap<HubHandle, ServerEnd>,
    invocations: Vec<RecordedInvoke>,
    connect_delay: Duration,
    failures_remaining: u32,
    pings_muted: bool,
    responder: Option<Responder>,
}

/// In-memory [`HubTransport`].
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    buffer_size: usize,
}

impl MemoryTransport {
    /// Create a transport that answers every invocation with `null`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            buffer_size: 64,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install the invocation responder.
    pub fn on_invoke<F>(&self, responder: F)
    where
        F: Fn(&HubHandle, &str, &[Value]) -> InvokeReply + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
    }

    /// Delay every handshake by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = delay;
    }

    /// Fail the next `count` handshakes with a transport error.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    /// Stop (or resume) answering keepalive pings on every link.
    pub fn mute_pings(&self, muted: bool) {
        self.lock().pings_muted = muted;
    }

    /// Number of handshakes observed for a hub.
    pub fn handshakes(&self, hub: &HubHandle) -> u64 {
        self.lock().handshakes.get(hub).copied().unwrap_or(0)
    }

    /// Bearer tokens presented at each handshake, in order.
    pub fn tokens_seen(&self, hub: &HubHandle) -> Vec<Option<String>> {
        self.lock()
            .tokens
            .iter()
            .filter(|(h, _)| h == hub)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Invocations received so far, across all hubs.
    pub fn invocations(&self) -> Vec<RecordedInvoke> {
        self.lock().invocations.clone()
    }

    /// Whether the client side of the current link is still open.
    pub fn is_link_open(&self, hub: &HubHandle) -> bool {
        self.lock()
            .links
            .get(hub)
            .map(|end| !end.to_client.is_closed())
            .unwrap_or(false)
    }

    /// Push an event on the current link. Returns `false` if there is none.
    pub async fn push(&self, hub: &HubHandle, target: &str, arguments: Vec<Value>) -> bool {
        let sender = self.lock().links.get(hub).map(|end| end.to_client.clone());
        match sender {
            Some(tx) => tx.send(ServerFrame::event(target, arguments)).await.is_ok(),
            None => false,
        }
    }

    /// Simulate a transport drop of the current link.
    pub fn drop_link(&self, hub: &HubHandle) -> bool {
        match self.lock().links.remove(hub) {
            Some(end) => {
                end.task.abort();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryTransport")
            .field("handshakes", &state.handshakes)
            .field("links", &state.links.len())
            .finish()
    }
}

#[async_trait]
impl HubTransport for MemoryTransport {
    async fn connect(&self, hub: &HubHandle, bearer: Option<String>) -> AppResult<TransportLink> {
        let delay = {
            let mut state = self.lock();
            *state.handshakes.entry(hub.clone()).or_insert(0) += 1;
            state.tokens.push((hub.clone(), bearer));
            state.connect_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.lock();
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                return Err(AppError::transport(format!(
                    "Simulated handshake failure for hub '{hub}'"
                )));
            }
        }

        let buffer = self.buffer_size.max(1);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientFrame>(buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerFrame>(buffer);

        let transport = self.clone();
        let server_tx = inbound_tx.clone();
        let server_hub = hub.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let reply = match frame {
                    ClientFrame::Ping => {
                        let muted = transport.lock().pings_muted;
                        (!muted).then_some(ServerFrame::Ping)
                    }
                    ClientFrame::Invoke {
                        invocation_id,
                        target,
                        arguments,
                    } => {
                        let responder = {
                            let mut state = transport.lock();
                            state.invocations.push(RecordedInvoke {
                                hub: server_hub.clone(),
                                target: target.clone(),
                                arguments: arguments.clone(),
                            });
                            state.responder.clone()
                        };
                        let answer = match responder {
                            Some(r) => r(&server_hub, &target, &arguments),
                            None => InvokeReply::Ok(Value::Null),
                        };
                        match answer {
                            InvokeReply::Ok(value) => Some(ServerFrame::ok(invocation_id, value)),
                            InvokeReply::Err(code, message) => {
                                Some(ServerFrame::err(invocation_id, code, message))
                            }
                            InvokeReply::NoReply => None,
                        }
                    }
                };
                if let Some(frame) = reply {
                    if server_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        });

        let previous = self.lock().links.insert(
            hub.clone(),
            ServerEnd {
                to_client: inbound_tx,
                task,
            },
        );
        if let Some(old) = previous {
            old.task.abort();
        }

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
