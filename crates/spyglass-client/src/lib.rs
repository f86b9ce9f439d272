//! Spyglass client - reference implementation of the inspector side
//!
//! Connects to a running agent over TCP, frames requests, correlates each
//! response back to its caller by request id, and surfaces notifications on
//! a channel. Primarily used by integration tests; also the reference for
//! inspector SDKs.
//!
//! # Example
//!
//! ```ignore
//! use spyglass_client::InspectorClient;
//! use spyglass_protocol::RequestKind;
//!
//! let (client, mut notifications) = InspectorClient::connect("127.0.0.1:9876").await?;
//! let response = client.request(RequestKind::Ping, None).await?;
//! assert!(response.success);
//! ```

mod error;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{tcp::OwnedWriteHalf, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use spyglass_protocol::{
    encode, Message, Notification, Request, RequestKind, Response, StreamBuffer, Value,
};

pub use error::ClientError;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

struct ClientInner {
    outbox: mpsc::UnboundedSender<Bytes>,
    pending: Mutex<HashMap<String, oneshot::Sender<Response>>>,
    next_id: AtomicU64,
}

/// A connected inspector client
#[derive(Clone)]
pub struct InspectorClient {
    inner: Arc<ClientInner>,
}

impl InspectorClient {
    /// Connect to an agent
    ///
    /// Returns the client plus the stream of subscription notifications.
    pub async fn connect(
        addr: impl ToSocketAddrs,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>)> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ClientInner {
            outbox,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(write_loop(write_half, outbox_rx));
        tokio::spawn(read_loop(read_half, Arc::clone(&inner), notifications_tx));

        Ok((Self { inner }, notifications_rx))
    }

    /// Send one request and await its response
    pub async fn request(
        &self,
        kind: RequestKind,
        params: Option<BTreeMap<String, Value>>,
    ) -> Result<Response> {
        let id = format!("req-{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Request {
            id: id.clone(),
            kind,
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id.clone(), tx);

        let frame = encode(&Message::Request(request))?;
        if self.inner.outbox.send(frame).is_err() {
            self.inner.pending.lock().remove(&id);
            return Err(ClientError::ConnectionClosed);
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Send pre-framed bytes as-is
    ///
    /// Escape hatch for tests exercising the server's framing behavior.
    pub fn send_raw(&self, frame: Bytes) -> Result<()> {
        self.inner
            .outbox
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Drop the connection; outstanding requests fail with
    /// [`ClientError::ConnectionClosed`]
    pub fn close(&self) {
        self.inner.pending.lock().clear();
        // Closing the outbox ends the write loop, which shuts the socket down
        let _ = self.inner.outbox.send(Bytes::new());
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbox_rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(frame) = outbox_rx.recv().await {
        if frame.is_empty() {
            break;
        }
        if let Err(e) = writer.write_all(&frame).await {
            debug!(error = %e, "send failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    inner: Arc<ClientInner>,
    notifications_tx: mpsc::UnboundedSender<Notification>,
) {
    let mut stream_buf = StreamBuffer::new();
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                stream_buf.extend(&chunk[..n]);
                while let Some(result) = stream_buf.next_message() {
                    match result {
                        Ok(Message::Response(response)) => {
                            let waiter = inner.pending.lock().remove(&response.id);
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(response);
                                }
                                None => {
                                    debug!(id = %response.id, "response without a waiter");
                                }
                            }
                        }
                        Ok(Message::Notification(notification)) => {
                            let _ = notifications_tx.send(notification);
                        }
                        Ok(Message::Request(_)) => {
                            debug!("agent sent a request; ignoring");
                        }
                        Err(e) => {
                            warn!(error = %e, "skipping malformed frame");
                        }
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "receive failed");
                break;
            }
        }
    }

    // Fail whatever is still waiting
    inner.pending.lock().clear();
}
