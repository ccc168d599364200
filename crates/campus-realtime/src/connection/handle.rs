//! Lease on a hub connection.

use std::fmt;

use tokio::sync::watch;

use crate::hub::HubHandle;

use super::manager::HubConnectionManager;
use super::state::ConnectionState;

/// One acquired reference to a hub connection.
///
/// Dropping the handle releases the reference, so a view that unmounts on
/// any path (success, error, cancellation) cannot leak an acquisition.
/// Releasing twice is impossible: [`ConnectionHandle::release`] consumes it.
pub struct ConnectionHandle {
    manager: HubConnectionManager,
    hub: HubHandle,
    state: watch::Receiver<ConnectionState>,
    released: bool,
}

impl ConnectionHandle {
    pub(crate) fn new(
        manager: HubConnectionManager,
        hub: HubHandle,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            manager,
            hub,
            state,
            released: false,
        }
    }

    /// The acquired hub.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// The manager this lease belongs to.
    pub fn manager(&self) -> &HubConnectionManager {
        &self.manager
    }

    /// Release the reference now.
    pub fn release(mut self) {
        self.release_once();
    }

    /// Give up the lease without releasing. The caller becomes responsible
    /// for a matching [`HubConnectionManager::release`].
    pub fn detach(mut self) -> HubHandle {
        self.released = true;
        self.hub.clone()
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.release(&self.hub);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("hub", &self.hub)
            .field("state", &*self.state.borrow())
            .field("released", &self.released)
            .finish()
    }
}
