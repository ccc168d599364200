//! Hub frame types and serialization.

pub mod serializer;
pub mod types;

pub use types::{ClientFrame, HubErrorDetail, ServerFrame};
