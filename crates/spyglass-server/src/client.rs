//! Per-connection state machine
//!
//! One [`ClientHandle`] + one connection task per accepted stream. The task
//! owns the receive loop; a companion writer task owns the socket's write
//! half and drains the send queue. Everything else in the server talks to
//! the connection through the cheaply-cloneable handle.
//!
//! # States
//!
//! `Starting → Ready → Closing → Closed`, forward-only:
//!
//! - peer EOF and explicit close enter `Closing`; queued frames drain before
//!   the socket shuts down
//! - transport failures jump straight to `Closed`
//! - sends into a `Closing`/`Closed` client are discarded, which is how
//!   in-flight dispatches for a dead client become no-ops
//!
//! A malformed frame never terminates the connection: the stream buffer
//! advances past it and the receive loop keeps going.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use spyglass_protocol::{
    encode_with_limit, Bytes, Message, Notification, Request, Response, StreamBuffer,
};

use crate::listener::BoxedStream;

/// Receive chunk size (64 KiB)
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    Starting,
    Ready,
    Closing,
    Closed,
}

/// Items on the send queue
pub(crate) enum Outgoing {
    Frame(Bytes),
    /// Drain marker: frames queued before it are written, then the socket
    /// shuts down
    Close,
}

struct ClientShared {
    id: Uuid,
    state: Mutex<ClientState>,
    outbox: mpsc::UnboundedSender<Outgoing>,
    subscriptions: Mutex<HashSet<String>>,
    max_message_bytes: usize,
}

/// Handle to one connected inspector client
#[derive(Clone)]
pub struct ClientHandle {
    shared: Arc<ClientShared>,
}

impl ClientHandle {
    pub(crate) fn new(max_message_bytes: usize) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let handle = Self {
            shared: Arc::new(ClientShared {
                id: Uuid::new_v4(),
                state: Mutex::new(ClientState::Starting),
                outbox,
                subscriptions: Mutex::new(HashSet::new()),
                max_message_bytes,
            }),
        };
        (handle, outbox_rx)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> ClientState {
        *self.shared.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ClientState::Ready
    }

    /// Queue a response; dropped once the client is closing
    pub fn send_response(&self, response: Response) {
        if self.state() > ClientState::Ready {
            debug!(client_id = %self.id(), "dropping response for closing client");
            return;
        }
        self.enqueue(&Message::Response(response));
    }

    /// Queue a notification; only `Ready` clients receive them
    pub fn send_notification(&self, notification: Notification) {
        if !self.is_ready() {
            return;
        }
        self.enqueue(&Message::Notification(notification));
    }

    /// Begin an orderly close: drain the send queue, then shut down
    pub fn close(&self) {
        if self.transition(ClientState::Closing) {
            let _ = self.shared.outbox.send(Outgoing::Close);
        }
    }

    fn enqueue(&self, message: &Message) {
        match encode_with_limit(message, self.shared.max_message_bytes) {
            Ok(frame) => {
                let _ = self.shared.outbox.send(Outgoing::Frame(frame));
            }
            Err(e) => {
                warn!(client_id = %self.id(), error = %e, "failed to encode outgoing message");
            }
        }
    }

    /// Advance the lifecycle; states only move forward
    pub(crate) fn transition(&self, to: ClientState) -> bool {
        let mut state = self.shared.state.lock();
        if to > *state {
            *state = to;
            true
        } else {
            false
        }
    }

    pub(crate) fn max_message_bytes(&self) -> usize {
        self.shared.max_message_bytes
    }

    // ------------------------------------------------------------------
    // Subscription membership
    // ------------------------------------------------------------------

    pub(crate) fn add_subscription(&self, id: &str) {
        self.shared.subscriptions.lock().insert(id.to_string());
    }

    pub(crate) fn remove_subscription(&self, id: &str) -> bool {
        self.shared.subscriptions.lock().remove(id)
    }

    pub(crate) fn owns_subscription(&self, id: &str) -> bool {
        self.shared.subscriptions.lock().contains(id)
    }

    pub(crate) fn take_subscriptions(&self) -> Vec<String> {
        self.shared.subscriptions.lock().drain().collect()
    }

    /// Number of live subscriptions owned by this client
    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.lock().len()
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Callbacks wiring one connection into the server
pub(crate) struct ConnectionHooks {
    /// Invoked for every decoded request, in receive order
    pub on_request: Box<dyn Fn(&ClientHandle, Request) + Send + Sync>,
    /// Invoked exactly once after the connection fully closes
    pub on_disconnect: Box<dyn FnOnce(&ClientHandle) + Send>,
}

/// Drive one connection to completion
pub(crate) async fn run_connection(
    stream: BoxedStream,
    handle: ClientHandle,
    outbox_rx: mpsc::UnboundedReceiver<Outgoing>,
    hooks: ConnectionHooks,
    cancel: CancellationToken,
) {
    let (mut reader, writer) = tokio::io::split(stream);

    // Reader cancels this on receive failure so the writer stops without
    // draining; write failures cancel `conn_cancel` to stop the reader.
    let writer_abort = CancellationToken::new();
    let conn_cancel = cancel.child_token();

    handle.transition(ClientState::Ready);

    let writer_task = tokio::spawn(write_loop(
        writer,
        outbox_rx,
        handle.clone(),
        conn_cancel.clone(),
        writer_abort.clone(),
    ));

    let mut stream_buf = StreamBuffer::with_max_frame_size(handle.max_message_bytes());
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        tokio::select! {
            _ = conn_cancel.cancelled() => {
                // Server shutdown or write failure; drain what's queued
                handle.close();
                break;
            }
            read = reader.read(&mut chunk) => match read {
                Ok(0) => {
                    debug!(client_id = %handle.id(), "peer closed the connection");
                    handle.close();
                    break;
                }
                Ok(n) => {
                    stream_buf.extend(&chunk[..n]);
                    while let Some(result) = stream_buf.next_message() {
                        match result {
                            Ok(Message::Request(request)) => (hooks.on_request)(&handle, request),
                            Ok(other) => {
                                debug!(
                                    client_id = %handle.id(),
                                    kind = other.kind(),
                                    "discarding unexpected message"
                                );
                            }
                            Err(e) => {
                                warn!(client_id = %handle.id(), error = %e, "skipping malformed frame");
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!(client_id = %handle.id(), error = %e, "receive failed");
                    handle.transition(ClientState::Closed);
                    writer_abort.cancel();
                    break;
                }
            }
        }
    }

    let _ = writer_task.await;
    handle.transition(ClientState::Closed);
    (hooks.on_disconnect)(&handle);
}

async fn write_loop(
    mut writer: WriteHalf<BoxedStream>,
    mut outbox_rx: mpsc::UnboundedReceiver<Outgoing>,
    handle: ClientHandle,
    conn_cancel: CancellationToken,
    writer_abort: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = writer_abort.cancelled() => break,
            item = outbox_rx.recv() => match item {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        debug!(client_id = %handle.id(), error = %e, "send failed");
                        handle.transition(ClientState::Closed);
                        conn_cancel.cancel();
                        break;
                    }
                }
                Some(Outgoing::Close) | None => break,
            }
        }
    }
    let _ = writer.shutdown().await;
}
