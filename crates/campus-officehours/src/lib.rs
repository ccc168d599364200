//! # campus-officehours
//!
//! Live office-hours queue for Campus Live:
//!
//! - [`QueueClient`]: a student's place in a slot's queue, replaced by each
//!   `StudentViewUpdated` push
//! - [`ProviderClient`]: the provider's view of a slot with call-next,
//!   complete and no-show
//! - [`ProofOfPresenceFlow`]: QR check-in with manual-entry fallback
//! - [`RestOfficeHoursApi`]: the request/response side of every action

pub mod api;
pub mod contract;
pub mod entry;
pub mod presence;
pub mod provider;
mod resync;
pub mod rest;
pub mod state;
pub mod student;

pub use api::OfficeHoursApi;
pub use entry::{EntryStatus, ProviderAction, ProviderView, QueueEntry, ReadySession};
pub use presence::{
    Camera, CheckInSink, Frame, ManualEntryReason, PresenceOutcome, ProofOfPresenceFlow,
    QrDecoder, TokenSource, VideoStream,
};
pub use provider::ProviderClient;
pub use rest::RestOfficeHoursApi;
pub use state::{ApplyOutcome, StudentView};
pub use student::{QueueClient, StudentCheckIn};
