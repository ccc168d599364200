//! Queue domain model as pushed by the office-hours hub.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use campus_core::types::{EntryId, SlotId, SubjectId};
use campus_core::{AppError, AppResult};

/// Status of a queue entry.
///
/// Transitions only move forward: `Waiting → Ready → InProgress → Done`,
/// with `Ready → NoShow` as the alternative terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EntryStatus {
    /// In line.
    Waiting,
    /// Called by the provider; a QR token is issued.
    Ready,
    /// Checked in and being serviced.
    InProgress,
    /// Serviced.
    Done,
    /// Did not show up while Ready.
    NoShow,
}

impl EntryStatus {
    /// Position in the forward-only order. Both terminals share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Ready => 1,
            Self::InProgress => 2,
            Self::Done | Self::NoShow => 3,
        }
    }

    /// `Done` or `NoShow`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::NoShow)
    }

    /// `Ready` or `InProgress`: the entry occupies the provider.
    pub fn is_servicing(&self) -> bool {
        matches!(self, Self::Ready | Self::InProgress)
    }

    /// Whether moving from `self` to `next` goes backwards. A terminal
    /// status is final, so any change away from it counts.
    pub fn is_regression_to(&self, next: EntryStatus) -> bool {
        next.rank() < self.rank() || (self.is_terminal() && next != *self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Ready => "Ready",
            Self::InProgress => "InProgress",
            Self::Done => "Done",
            Self::NoShow => "NoShow",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One student's place in a slot's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub entry_id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<SlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,
    /// 1-based; absent once serviced.
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub estimated_wait_minutes: Option<u32>,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// A bare entry with the given status.
    pub fn new(entry_id: EntryId, status: EntryStatus) -> Self {
        Self {
            entry_id,
            slot_id: None,
            subject_id: None,
            position: None,
            estimated_wait_minutes: None,
            status,
            qr_token: None,
            token_expires_at: None,
        }
    }

    /// The ready session carried by this entry, if it is Ready with a token.
    pub fn ready_session(&self) -> Option<ReadySession> {
        if self.status != EntryStatus::Ready {
            return None;
        }
        Some(ReadySession {
            entry_id: self.entry_id,
            qr_token: self.qr_token.clone()?,
            token_expires_at: self.token_expires_at?,
        })
    }

    /// Whether this entry belongs to `slot` (entries without a slot id match).
    pub fn belongs_to(&self, slot: SlotId) -> bool {
        self.slot_id.is_none_or(|s| s == slot)
    }
}

/// The window in which a called student must prove presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadySession {
    pub entry_id: EntryId,
    pub qr_token: String,
    pub token_expires_at: DateTime<Utc>,
}

impl ReadySession {
    /// Whether the token may still be shown, hiding it `margin` early.
    ///
    /// Advisory only: the server decides validity at check-in.
    pub fn is_presentable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        is_before_deadline(now, self.token_expires_at, margin)
    }

    /// Time left until server expiry (zero once passed).
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.token_expires_at - now).to_std().unwrap_or_default()
    }
}

fn is_before_deadline(now: DateTime<Utc>, deadline: DateTime<Utc>, margin: Duration) -> bool {
    let margin = TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX);
    match now.checked_add_signed(margin) {
        Some(cutoff) => cutoff < deadline,
        None => false,
    }
}

/// Provider-side snapshot of a slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    /// Slot the snapshot describes, when the backend says so.
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    #[serde(default)]
    pub current: Option<QueueEntry>,
    #[serde(default)]
    pub current_qr_token: Option<String>,
    #[serde(default)]
    pub current_qr_expires_at: Option<DateTime<Utc>>,
}

/// Mutations a provider can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAction {
    CallNext,
    CompleteCurrent,
    MarkNoShow,
}

impl fmt::Display for ProviderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CallNext => "call-next",
            Self::CompleteCurrent => "complete",
            Self::MarkNoShow => "no-show",
        })
    }
}

impl ProviderView {
    /// Whether this snapshot describes `slot`. Without a view-level slot id
    /// the entries decide; a snapshot with no slot ids at all matches.
    pub fn belongs_to(&self, slot: SlotId) -> bool {
        match self.slot_id {
            Some(id) => id == slot,
            None => self
                .current
                .iter()
                .chain(self.queue.iter())
                .all(|e| e.belongs_to(slot)),
        }
    }

    /// Status of the current entry.
    pub fn current_status(&self) -> Option<EntryStatus> {
        self.current.as_ref().map(|c| c.status)
    }

    /// Whether an entry is Ready or InProgress.
    pub fn is_servicing(&self) -> bool {
        self.current_status().is_some_and(|s| s.is_servicing())
    }

    /// Entries still waiting.
    pub fn waiting(&self) -> impl Iterator<Item = &QueueEntry> {
        self.queue
            .iter()
            .filter(|e| e.status == EntryStatus::Waiting)
    }

    /// The QR token to display, hidden `margin` before expiry and whenever
    /// the current entry is no longer Ready.
    pub fn visible_qr(&self, now: DateTime<Utc>, margin: Duration) -> Option<&str> {
        if self.current_status() != Some(EntryStatus::Ready) {
            return None;
        }
        let token = self.current_qr_token.as_deref()?;
        let expires = self.current_qr_expires_at?;
        is_before_deadline(now, expires, margin).then_some(token)
    }

    /// Whether `action` would be accepted against this snapshot.
    pub fn guard(&self, action: ProviderAction) -> AppResult<()> {
        match action {
            ProviderAction::CallNext => {
                if let Some(current) = self.current.as_ref().filter(|c| c.status.is_servicing()) {
                    return Err(AppError::already_servicing(format!(
                        "Entry {} is still {}",
                        current.entry_id, current.status
                    )));
                }
                if self.waiting().next().is_none() {
                    return Err(AppError::no_one_waiting("No student is waiting"));
                }
                Ok(())
            }
            ProviderAction::CompleteCurrent => {
                self.require_current(EntryStatus::InProgress, action)
            }
            ProviderAction::MarkNoShow => self.require_current(EntryStatus::Ready, action),
        }
    }

    fn require_current(&self, expected: EntryStatus, action: ProviderAction) -> AppResult<()> {
        match self.current_status() {
            Some(status) if status == expected => Ok(()),
            Some(status) => Err(AppError::invalid_state(format!(
                "Cannot {action}: current entry is {status}, expected {expected}"
            ))),
            None => Err(AppError::invalid_state(format!(
                "Cannot {action}: no current entry"
            ))),
        }
    }
}
