//! Spyglass wire protocol - message types and framing for the inspector link
//!
//! This crate provides the types that cross the wire between a spyglass agent
//! and an inspector client:
//!
//! - [`Value`] - JSON-compatible tagged value used in every payload
//! - [`Message`] - the envelope: request, response, or notification
//! - [`frame`] - length-prefixed framing and the incremental [`StreamBuffer`]
//!
//! # Wire Format
//!
//! Every message is framed with a 4-byte big-endian length prefix:
//! ```text
//! [4 bytes: payload length (big-endian)][N bytes: UTF-8 JSON message]
//! ```
//!
//! The JSON payload is an envelope `{"type": ..., "payload": ...}` where
//! `type` is one of `request`, `response`, or `notification`.
//!
//! # Design Principles
//!
//! - **Stream-safe**: the [`StreamBuffer`] turns an arbitrary TCP byte stream
//!   into a sequence of complete messages; a malformed frame never poisons
//!   the frames after it
//! - **Deterministic output**: object keys serialize in sorted order
//! - **Bounded**: frames larger than the configured maximum are rejected
//!   with a distinct error

mod error;
mod frame;
mod message;
mod value;

pub use error::ProtocolError;
pub use frame::{decode, encode, encode_with_limit, StreamBuffer};
pub use message::{ChangeSet, Message, Notification, Request, RequestKind, Response};
pub use value::Value;

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Length prefix size (4 bytes, big-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum total frame size, header included (10 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default TCP port for the network transport
pub const DEFAULT_NETWORK_PORT: u16 = 9876;

/// Default TCP port for the USB-muxed transport
pub const DEFAULT_USB_PORT: u16 = 9877;

#[cfg(test)]
mod message_test;
