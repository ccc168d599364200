//! JSON text encoding for hub frames.

use campus_core::{AppError, AppResult, ErrorKind};

use super::types::{ClientFrame, ServerFrame};

/// Serialize a client frame to a text message.
pub fn encode_client(frame: &ClientFrame) -> AppResult<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Deserialize a server frame from a text message.
pub fn decode_server(text: &str) -> AppResult<ServerFrame> {
    serde_json::from_str(text).map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Invalid hub frame: {e}"),
            e,
        )
    })
}
