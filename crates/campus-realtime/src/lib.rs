//! # campus-realtime
//!
//! Push-connection engine for Campus Live. Provides:
//!
//! - One ref-counted connection per hub with start deduplication and
//!   deferred, cancellable teardown
//! - Reconnect with a declared backoff policy and ping keepalive
//! - Event subscriptions that survive reconnects, disposed via handles
//! - Request/response invokes over the push channel
//! - WebSocket and in-memory transports
//! - The notifications hub feed

pub mod channel;
pub mod connection;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod notification;
pub mod transport;

pub use channel::Subscription;
pub use connection::{ConnectionHandle, ConnectionState, HubConnectionManager, ReconnectPolicy};
pub use hub::HubHandle;
pub use metrics::HubMetricsSnapshot;
pub use notification::NotificationFeed;
pub use transport::{HubTransport, InvokeReply, MemoryTransport, TransportLink, WebSocketTransport};
