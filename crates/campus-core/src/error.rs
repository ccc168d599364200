//! Unified error types for Campus Live.
//!
//! Every crate maps its failures into [`AppError`] so that hub, REST and
//! device failures propagate through `?` with a single classification.

use std::fmt;
use thiserror::Error;

/// Error kind categorization used across the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// An invoke was attempted without a Connected hub connection.
    NotConnected,
    /// The hub connection dropped (or is reconnecting) while a call was in flight.
    Disconnected,
    /// The student already holds an active entry for the slot.
    AlreadyQueued,
    /// The slot no longer accepts queue entries.
    SlotClosed,
    /// `call-next` was requested with an empty queue.
    NoOneWaiting,
    /// `call-next` was requested while an entry is Ready or InProgress.
    AlreadyServicing,
    /// The current entry is not in the status the action requires.
    InvalidState,
    /// The presented proof-of-presence token was rejected.
    InvalidOrExpiredToken,
    /// The camera could not be acquired or stopped producing frames.
    CameraUnavailable,
    /// The user denied camera access.
    CameraPermissionDenied,
    /// The runtime has no QR decoding capability.
    DecodeUnsupported,
    /// An operation did not complete within its deadline.
    Timeout,
    /// The underlying network transport failed.
    Transport,
    /// The bearer token could not be resolved or was refused.
    Authentication,
    /// The backend returned an error not covered by a more specific kind.
    Api,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// An internal client error occurred.
    Internal,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::AlreadyQueued => "ALREADY_QUEUED",
            Self::SlotClosed => "SLOT_CLOSED",
            Self::NoOneWaiting => "NO_ONE_WAITING",
            Self::AlreadyServicing => "ALREADY_SERVICING",
            Self::InvalidState => "INVALID_STATE",
            Self::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            Self::CameraUnavailable => "CAMERA_UNAVAILABLE",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::DecodeUnsupported => "DECODE_UNSUPPORTED",
            Self::Timeout => "TIMEOUT",
            Self::Transport => "TRANSPORT",
            Self::Authentication => "AUTHENTICATION",
            Self::Api => "API",
            Self::Serialization => "SERIALIZATION",
            Self::Configuration => "CONFIGURATION",
            Self::Internal => "INTERNAL",
        }
    }

    /// Map a backend error code back to a kind.
    ///
    /// Matching is case-insensitive and accepts both `SNAKE_CASE` and
    /// `PascalCase` spellings. Unknown codes map to [`ErrorKind::Api`].
    pub fn from_code(code: &str) -> Self {
        let normalized: String = code
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "notconnected" => Self::NotConnected,
            "disconnected" => Self::Disconnected,
            "alreadyqueued" => Self::AlreadyQueued,
            "slotclosed" => Self::SlotClosed,
            "noonewaiting" => Self::NoOneWaiting,
            "alreadyservicing" => Self::AlreadyServicing,
            "invalidstate" => Self::InvalidState,
            "invalidorexpiredtoken" | "invalidtoken" | "expiredtoken" => {
                Self::InvalidOrExpiredToken
            }
            "cameraunavailable" => Self::CameraUnavailable,
            "camerapermissiondenied" => Self::CameraPermissionDenied,
            "decodeunsupported" => Self::DecodeUnsupported,
            "timeout" => Self::Timeout,
            "transport" => Self::Transport,
            "unauthorized" | "authentication" => Self::Authentication,
            "serialization" => Self::Serialization,
            "configuration" => Self::Configuration,
            "internal" => Self::Internal,
            _ => Self::Api,
        }
    }

    /// Connection-level failures: the manager retries these transparently.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Disconnected | Self::Transport | Self::Timeout
        )
    }

    /// Protocol-level failures: a stale client view. Never retried
    /// automatically; the canonical snapshot must be re-fetched first.
    pub fn requires_refetch(&self) -> bool {
        matches!(
            self,
            Self::AlreadyQueued
                | Self::SlotClosed
                | Self::NoOneWaiting
                | Self::AlreadyServicing
                | Self::InvalidState
                | Self::InvalidOrExpiredToken
        )
    }

    /// Device-level failures: degrade to manual token entry.
    pub fn is_device_level(&self) -> bool {
        matches!(
            self,
            Self::CameraUnavailable | Self::CameraPermissionDenied | Self::DecodeUnsupported
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The unified error used throughout Campus Live.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an error from a backend error code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_code(code), message)
    }

    /// Create a not-connected error.
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected, message)
    }

    /// Create a disconnected error.
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disconnected, message)
    }

    /// Create an already-queued error.
    pub fn already_queued(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyQueued, message)
    }

    /// Create a slot-closed error.
    pub fn slot_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SlotClosed, message)
    }

    /// Create a no-one-waiting error.
    pub fn no_one_waiting(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoOneWaiting, message)
    }

    /// Create an already-servicing error.
    pub fn already_servicing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyServicing, message)
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Create an invalid-or-expired-token error.
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOrExpiredToken, message)
    }

    /// Create a camera-unavailable error.
    pub fn camera_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CameraUnavailable, message)
    }

    /// Create a camera-permission-denied error.
    pub fn camera_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CameraPermissionDenied, message)
    }

    /// Create a decode-unsupported error.
    pub fn decode_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeUnsupported, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Create a generic API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether this error has the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

// The source is dropped: a single connect failure is fanned out to every
// concurrent acquirer, and boxed causes are not `Clone`.
impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
