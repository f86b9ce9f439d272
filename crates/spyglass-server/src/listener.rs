//! The listener seam
//!
//! The server consumes an abstract [`Listener`] yielding accepted byte
//! streams. The built-in [`TcpServerListener`] covers both the network and
//! the USB-muxed transport (the USB side is plain TCP behind a
//! port-forwarding mux, which is an external collaborator). Tests and hosts
//! with exotic transports can plug in their own implementation.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::{Result, ServerError};

/// A bidirectional byte stream carrying inspector frames
pub trait InspectorStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> InspectorStream for T {}

/// An accepted connection, type-erased
pub type BoxedStream = Box<dyn InspectorStream>;

/// Source of accepted inspector connections
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next connection
    async fn accept(&mut self) -> io::Result<BoxedStream>;

    /// The bound local address, when the transport has one
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// TCP listener for the network and USB-muxed transports
pub struct TcpServerListener {
    inner: TcpListener,
}

impl TcpServerListener {
    /// Bind to the given address
    pub async fn bind(address: &str) -> Result<Self> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Bind {
                address: address.to_string(),
                source: e,
            })?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for TcpServerListener {
    async fn accept(&mut self) -> io::Result<BoxedStream> {
        let (stream, peer) = self.inner.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        tracing::debug!(peer = %peer, "accepted inspector connection");
        Ok(Box::new(stream))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr().ok()
    }
}
