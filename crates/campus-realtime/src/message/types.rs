//! Client and server hub frame definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use campus_core::AppError;

/// Frames sent by the client to a hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Request/response call over the push channel.
    Invoke {
        /// Correlates the server's completion.
        invocation_id: String,
        /// Hub method name.
        target: String,
        /// Positional arguments.
        #[serde(default)]
        arguments: Vec<Value>,
    },
    /// Keepalive.
    Ping,
}

/// Frames sent by a hub to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Server push.
    Event {
        /// Event name, e.g. `StudentViewUpdated`.
        target: String,
        /// Positional arguments.
        #[serde(default)]
        arguments: Vec<Value>,
    },
    /// Reply to an [`ClientFrame::Invoke`].
    Completion {
        /// The invocation being answered.
        invocation_id: String,
        /// Result payload on success.
        #[serde(default)]
        result: Option<Value>,
        /// Error on failure.
        #[serde(default)]
        error: Option<HubErrorDetail>,
    },
    /// Keepalive.
    Ping,
    /// Server-initiated close.
    Close {
        /// Optional reason.
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ServerFrame {
    /// Build an event frame.
    pub fn event(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Event {
            target: target.into(),
            arguments,
        }
    }

    /// Build a successful completion.
    pub fn ok(invocation_id: impl Into<String>, result: Value) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build a failed completion.
    pub fn err(
        invocation_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(HubErrorDetail {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Error carried by a failed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubErrorDetail {
    /// Backend error code, mapped through [`campus_core::ErrorKind::from_code`].
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl From<HubErrorDetail> for AppError {
    fn from(detail: HubErrorDetail) -> Self {
        AppError::from_code(&detail.code, detail.message)
    }
}
