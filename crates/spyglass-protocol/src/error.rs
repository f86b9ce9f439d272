//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire messages
///
/// "Need more data" is not an error: [`StreamBuffer::next_message`] returns
/// `None` for an incomplete frame and the caller keeps reading.
///
/// [`StreamBuffer::next_message`]: crate::StreamBuffer::next_message
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured maximum size (header + payload)
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload is not valid JSON
    #[error("malformed JSON payload: {0}")]
    MalformedJson(String),

    /// Envelope `type` field is missing or not a known tag
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Envelope is well-formed but the payload does not match its type
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },

    /// Message serialization failed (should not happen for valid values)
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn malformed_payload(kind: &'static str, err: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            kind,
            reason: err.to_string(),
        }
    }
}
