//! Spyglass adapter - the contract between the protocol server and a database
//!
//! The inspector server never talks to a database engine directly. It
//! consumes the narrow [`DatabaseAdapter`] trait: schema introspection, query
//! with pagination, read/write by primary key, purge, and live observation.
//! Any engine that can satisfy this contract is a valid backend.
//!
//! # Thread affinity
//!
//! Embedded object databases typically require that all interaction happens
//! on one thread with a live event loop. The adapter contract models this
//! explicitly instead of hiding it:
//!
//! - every trait method is synchronous and is called by the server from a
//!   single dedicated execution context
//! - [`DatabaseAdapter::observe`] returns an [`Observation`] owning both a
//!   cancellation token and an opaque context handle that must stay alive
//!   until the registration is cancelled
//! - change events are delivered on one adapter-affine context
//!
//! # Reference backend
//!
//! [`memory::MemoryAdapter`] is a complete in-memory implementation used by
//! the integration tests and the demo agent binary.

mod adapter;
mod error;
pub mod memory;
mod predicate;
mod serializer;
mod types;

pub use adapter::{ChangeSink, DatabaseAdapter, Observation};
pub use error::AdapterError;
pub use serializer::{serialize_document, SerializerLimits};
pub use types::{
    ChangeEvent, DatabaseInfo, PropertyInfo, PropertyType, PurgeResult, QueryParams, QueryResult,
    SchemaInfo,
};

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;
