//! Adapter error taxonomy
//!
//! These are the failures a backend may report to the server. The dispatcher
//! serializes them verbatim as the human-readable `error` string of an
//! unsuccessful response.

use thiserror::Error;

/// Errors a database backend can report
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Named type is not part of the schema
    #[error("type '{0}' not found in schema")]
    UnknownType(String),

    /// Filter string failed to parse or reference resolvable properties
    #[error("invalid predicate '{filter}': {reason}")]
    InvalidPredicate { filter: String, reason: String },

    /// Primary key value has the wrong shape for the target type
    #[error("invalid primary key: {0}")]
    InvalidPrimaryKey(String),

    /// Mutation names a property the schema does not declare
    #[error("property '{property}' not found on type '{type_name}'")]
    PropertyNotFound { type_name: String, property: String },

    /// No object with the given primary key
    #[error("object of type '{type_name}' with key '{key}' not found")]
    NotFound { type_name: String, key: String },

    /// An object with the given primary key already exists
    #[error("object of type '{type_name}' with key '{key}' already exists")]
    AlreadyExists { type_name: String, key: String },

    /// The engine rejected a write
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The database is open read-only
    #[error("database is read-only: {0}")]
    ReadOnly(String),
}

impl AdapterError {
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType(name.into())
    }

    pub fn invalid_predicate(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(type_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            key: key.into(),
        }
    }

    pub fn already_exists(type_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            type_name: type_name.into(),
            key: key.into(),
        }
    }

    pub fn property_not_found(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            type_name: type_name.into(),
            property: property.into(),
        }
    }
}
