//! Server error types

use std::io;

use thiserror::Error;

/// Errors surfaced by the server lifecycle
///
/// Per-request failures never appear here: they are serialized into the
/// failing response. Transport errors terminate the affected client only.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` called while the server is already running
    #[error("server is already running")]
    AlreadyRunning,

    /// Failed to bind a listener
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error outside of a specific client connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The adapter context has shut down
    #[error("adapter context closed")]
    ContextClosed,

    /// No listener configured for the requested transport mode
    #[error("no listeners configured")]
    NoListeners,
}
