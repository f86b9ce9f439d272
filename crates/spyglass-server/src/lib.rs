//! Spyglass server - the in-process inspector agent
//!
//! This crate is the protocol server an application embeds to expose its
//! local object database to an inspector UI:
//!
//! ```text
//! Listener ──► Server ──► ClientConnection ──► StreamBuffer ──► codec
//!                │                                               │
//!                │              requests                         ▼
//!                ├──► SubscriptionManager ◄── subscribe/unsubscribe
//!                └──► Dispatcher          ◄── everything else
//!                            │
//!                            ▼
//!                     AdapterContext (one dedicated thread)
//!                            │
//!                            ▼
//!                      DatabaseAdapter
//! ```
//!
//! Every database interaction runs on a single dedicated adapter context,
//! modeling the thread-affinity rule embedded object databases impose.
//! Replies are posted from that context, which is what guarantees a
//! subscription's success response is queued before its first notification.
//!
//! # Security
//!
//! This is a debug tool. The transport is unauthenticated and unencrypted by
//! design; the server binds to loopback unless configured otherwise. Do not
//! enable it in production builds.

mod client;
mod config;
mod context;
mod dispatch;
mod error;
mod listener;
mod server;
mod subscription;

pub use client::{ClientHandle, ClientState};
pub use config::{SerializerConfig, ServerConfig, TransportMode};
pub use context::AdapterContext;
pub use dispatch::Dispatcher;
pub use error::ServerError;
pub use listener::{BoxedStream, InspectorStream, Listener, TcpServerListener};
pub use server::Server;
pub use subscription::SubscriptionManager;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
