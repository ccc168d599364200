//! Transport seam between the connection manager and the network.
//!
//! A transport turns a hub handle plus a freshly resolved bearer token into
//! a [`TransportLink`]: a pair of frame channels. The link is considered
//! dropped when `inbound` yields `None`; the manager closes it by dropping
//! `outbound`.

pub mod memory;
pub mod websocket;

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use campus_core::AppResult;

use crate::hub::HubHandle;
use crate::message::{ClientFrame, ServerFrame};

pub use memory::{InvokeReply, MemoryTransport};
pub use websocket::WebSocketTransport;

/// One established connection to a hub.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to the server.
    pub outbound: mpsc::Sender<ClientFrame>,
    /// Frames from the server, in arrival order.
    pub inbound: mpsc::Receiver<ServerFrame>,
}

/// Opens hub connections.
#[async_trait]
pub trait HubTransport: Send + Sync + fmt::Debug + 'static {
    /// Perform one handshake. `bearer` was resolved for this attempt only.
    async fn connect(&self, hub: &HubHandle, bearer: Option<String>) -> AppResult<TransportLink>;
}
