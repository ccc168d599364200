//! Hub connection lifecycle: ref-counted leases, reconnect policy, keepalive.

pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod policy;
pub mod state;

pub use handle::ConnectionHandle;
pub use manager::HubConnectionManager;
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
