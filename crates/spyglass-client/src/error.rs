//! Client error types

use std::io;

use thiserror::Error;

use spyglass_protocol::ProtocolError;

/// Errors the inspector client can surface
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection closed before a response arrived
    #[error("connection closed")]
    ConnectionClosed,

    /// Outgoing message failed to encode
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
