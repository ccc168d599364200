//! Client-held session state, replaced wholesale by each snapshot.

use tokio::sync::watch;
use tracing::debug;

use super::entry::{EntryStatus, ProviderView, QueueEntry, ReadySession};

/// Result of applying one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The view now equals the snapshot.
    Replaced,
    /// The entry was removed.
    Cleared,
    /// The snapshot equalled the current view.
    Unchanged,
    /// The snapshot would have moved the same entry backwards.
    Ignored,
}

impl ApplyOutcome {
    /// Whether observers should be notified.
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Replaced | Self::Cleared)
    }
}

/// The student's view of their own queue entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentView {
    entry: Option<QueueEntry>,
}

impl StudentView {
    /// The current entry.
    pub fn entry(&self) -> Option<&QueueEntry> {
        self.entry.as_ref()
    }

    /// Status of the current entry.
    pub fn status(&self) -> Option<EntryStatus> {
        self.entry.as_ref().map(|e| e.status)
    }

    /// The pending ready session, if the entry is Ready.
    pub fn ready_session(&self) -> Option<ReadySession> {
        self.entry.as_ref().and_then(QueueEntry::ready_session)
    }

    /// Apply a snapshot.
    ///
    /// Snapshots replace the view; fields are never merged. A snapshot for
    /// the same entry with a lower status rank, or one that changes a
    /// terminal status, is stale and ignored. An
    /// empty snapshot clears a Waiting or terminal entry only.
    pub fn apply(&mut self, snapshot: Option<QueueEntry>) -> ApplyOutcome {
        match (self.entry.as_ref(), snapshot) {
            (None, None) => ApplyOutcome::Unchanged,
            (Some(current), None) => {
                if current.status == EntryStatus::Waiting || current.status.is_terminal() {
                    self.entry = None;
                    ApplyOutcome::Cleared
                } else {
                    debug!(entry_id = %current.entry_id, status = %current.status, "Ignoring empty snapshot for active entry");
                    ApplyOutcome::Ignored
                }
            }
            (Some(current), Some(next))
                if current.entry_id == next.entry_id
                    && current.status.is_regression_to(next.status) =>
            {
                debug!(
                    entry_id = %next.entry_id,
                    from = %current.status,
                    to = %next.status,
                    "Ignoring stale snapshot"
                );
                ApplyOutcome::Ignored
            }
            (Some(current), Some(next)) if *current == next => ApplyOutcome::Unchanged,
            (_, Some(next)) => {
                self.entry = Some(next);
                ApplyOutcome::Replaced
            }
        }
    }
}

/// Publishes a [`StudentView`] to any number of watchers.
#[derive(Debug)]
pub struct StudentViewStore {
    tx: watch::Sender<StudentView>,
}

impl Default for StudentViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StudentViewStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StudentView::default());
        Self { tx }
    }

    /// Apply a snapshot, notifying watchers on change.
    pub fn apply(&self, snapshot: Option<QueueEntry>) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::Unchanged;
        self.tx.send_if_modified(|view| {
            outcome = view.apply(snapshot);
            outcome.is_change()
        });
        outcome
    }

    /// Current view.
    pub fn current(&self) -> StudentView {
        self.tx.borrow().clone()
    }

    /// Watch for changes.
    pub fn watch(&self) -> watch::Receiver<StudentView> {
        self.tx.subscribe()
    }
}

/// Publishes the provider's [`ProviderView`].
#[derive(Debug)]
pub struct ProviderViewStore {
    tx: watch::Sender<ProviderView>,
}

impl Default for ProviderViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderViewStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProviderView::default());
        Self { tx }
    }

    /// Replace the view wholesale.
    pub fn replace(&self, view: ProviderView) -> ApplyOutcome {
        let changed = self.tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
        if changed {
            ApplyOutcome::Replaced
        } else {
            ApplyOutcome::Unchanged
        }
    }

    pub fn current(&self) -> ProviderView {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ProviderView> {
        self.tx.subscribe()
    }
}
