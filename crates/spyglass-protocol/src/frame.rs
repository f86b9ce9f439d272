//! Length-prefixed framing and the incremental stream buffer
//!
//! A frame is `[u32 length (big-endian)][length bytes of UTF-8 JSON]`. The
//! [`StreamBuffer`] accepts arbitrary byte chunks from a socket and peels off
//! complete frames front to back, so callers never deal with partial reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::{Message, Result, DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE};

/// Encode a message into a length-prefixed frame using the default size limit
pub fn encode(message: &Message) -> Result<Bytes> {
    encode_with_limit(message, DEFAULT_MAX_MESSAGE_SIZE)
}

/// Encode a message into a length-prefixed frame
///
/// Fails with [`ProtocolError::FrameTooLarge`] when the total frame size
/// (header + payload) exceeds `max_frame_size`.
pub fn encode_with_limit(message: &Message, max_frame_size: usize) -> Result<Bytes> {
    let payload = serde_json::to_vec(message)?;

    let total = LENGTH_PREFIX_SIZE + payload.len();
    if total > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: total,
            max: max_frame_size,
        });
    }

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Decode a message from a frame payload (without the length prefix)
pub fn decode(payload: &[u8]) -> Result<Message> {
    let envelope: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

    let tag = envelope
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::UnknownMessageType("<missing>".into()))?;

    let payload = envelope
        .get("payload")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    match tag {
        "request" => serde_json::from_value(payload)
            .map(Message::Request)
            .map_err(|e| ProtocolError::malformed_payload("request", e)),
        "response" => serde_json::from_value(payload)
            .map(Message::Response)
            .map_err(|e| ProtocolError::malformed_payload("response", e)),
        "notification" => serde_json::from_value(payload)
            .map(Message::Notification)
            .map_err(|e| ProtocolError::malformed_payload("notification", e)),
        other => Err(ProtocolError::UnknownMessageType(other.to_string())),
    }
}

/// Incremental frame accumulator for one byte stream
///
/// Append chunks as they arrive with [`extend`](Self::extend), then drain
/// complete messages with [`next_message`](Self::next_message):
///
/// - `None` - fewer than a full frame is buffered; keep reading
/// - `Some(Ok(msg))` - one complete frame decoded, cursor advanced past it
/// - `Some(Err(e))` - one complete frame was malformed or oversized; the
///   cursor still advanced past it, so later frames decode normally
///
/// Oversized frames are skipped without buffering their payload: the buffer
/// discards the frame's bytes as they arrive.
#[derive(Debug)]
pub struct StreamBuffer {
    buf: BytesMut,
    max_frame_size: usize,
    /// Bytes of an oversized frame still to be discarded
    skip_remaining: usize,
}

impl StreamBuffer {
    /// Create a stream buffer with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a stream buffer with a custom frame size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            max_frame_size,
            skip_remaining: 0,
        }
    }

    /// Append a chunk of bytes received from the transport
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of bytes currently buffered
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Extract the next complete message, if one is buffered
    pub fn next_message(&mut self) -> Option<Result<Message>> {
        // Finish discarding an oversized frame before looking at new data
        if self.skip_remaining > 0 {
            let discard = self.skip_remaining.min(self.buf.len());
            self.buf.advance(discard);
            self.skip_remaining -= discard;
            if self.skip_remaining > 0 {
                return None;
            }
        }

        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return None;
        }

        let payload_len =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        let total = LENGTH_PREFIX_SIZE + payload_len;

        if total > self.max_frame_size {
            // Drop what we have of this frame and remember how much is left
            let consumed = total.min(self.buf.len());
            self.buf.advance(consumed);
            self.skip_remaining = total - consumed;
            return Some(Err(ProtocolError::FrameTooLarge {
                size: total,
                max: self.max_frame_size,
            }));
        }

        if self.buf.len() < total {
            return None;
        }

        let result = decode(&self.buf[LENGTH_PREFIX_SIZE..total]);
        self.buf.advance(total);
        Some(result)
    }

    /// Extract every complete, well-formed message currently buffered
    ///
    /// Malformed frames are skipped and returned as errors alongside the
    /// decoded messages, in stream order.
    pub fn drain(&mut self) -> Vec<Result<Message>> {
        let mut out = Vec::new();
        while let Some(result) = self.next_message() {
            out.push(result);
        }
        out
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}
