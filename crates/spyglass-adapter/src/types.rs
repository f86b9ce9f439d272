//! Types crossing the adapter boundary
//!
//! All of these serialize in the camelCase shape the inspector UI renders,
//! so the dispatcher can turn them into response payloads without a mapping
//! layer.

use std::fmt;

use serde::ser::Serializer;
use serde::Serialize;

use spyglass_protocol::Value;

/// Summary of the open database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub path: String,
    pub schema_version: u64,
    pub object_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    pub is_in_memory: bool,
    pub is_sync_enabled: bool,
}

/// Schema of one object type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    pub properties: Vec<PropertyInfo>,
    pub is_embedded: bool,
}

impl SchemaInfo {
    /// Look up a declared property by name
    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// One declared property of an object type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub is_optional: bool,
    pub is_primary_key: bool,
    pub is_indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_class_name: Option<String>,
}

impl PropertyInfo {
    /// A plain required property of the given type
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            is_optional: false,
            is_primary_key: false,
            is_indexed: false,
            object_class_name: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_indexed = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }
}

/// The closed set of property type tags the inspector understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Int,
    Bool,
    Float,
    Double,
    String,
    Data,
    Date,
    ObjectId,
    Decimal128,
    /// A property that can hold any value
    Any,
    /// Forward link to another object type
    Link(String),
    /// Reverse link collection from another object type
    LinkingObjects(String),
    Unknown,
}

impl PropertyType {
    /// Target type for link-shaped properties
    pub fn link_target(&self) -> Option<&str> {
        match self {
            PropertyType::Link(target) | PropertyType::LinkingObjects(target) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Int => write!(f, "Int"),
            PropertyType::Bool => write!(f, "Bool"),
            PropertyType::Float => write!(f, "Float"),
            PropertyType::Double => write!(f, "Double"),
            PropertyType::String => write!(f, "String"),
            PropertyType::Data => write!(f, "Data"),
            PropertyType::Date => write!(f, "Date"),
            PropertyType::ObjectId => write!(f, "ObjectId"),
            PropertyType::Decimal128 => write!(f, "Decimal128"),
            PropertyType::Any => write!(f, "AnyRealmValue"),
            PropertyType::Link(target) => write!(f, "Link<{target}>"),
            PropertyType::LinkingObjects(target) => write!(f, "LinkingObjects<{target}>"),
            PropertyType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Serialize for PropertyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parameters of a paginated query
///
/// Defaults (`limit` 50, `skip` 0, ascending) are applied by the dispatcher,
/// not the adapter.
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub type_name: String,
    pub filter: Option<String>,
    pub sort_key_path: Option<String>,
    pub ascending: bool,
    pub limit: i64,
    pub skip: i64,
}

impl QueryParams {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            filter: None,
            sort_key_path: None,
            ascending: true,
            limit: 50,
            skip: 0,
        }
    }
}

/// One page of query results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub documents: Vec<Value>,
    pub total_count: i64,
    pub skip: i64,
    pub limit: i64,
    pub has_more: bool,
}

/// Outcome of a whole-database purge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResult {
    pub collections_cleared: i64,
    pub total_deleted: i64,
    pub collections: Vec<String>,
}

/// One event emitted by a live observation
///
/// Indices in the `Update` variant reference positions in `results` as they
/// stand *after* the update. Deleted rows are no longer present, so their
/// indices refer to the pre-delete ordering; consumers that need a stable
/// identity for deletions must fall back to that ordinal.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// First delivery after registration; carries no diff
    Initial,
    Update {
        /// Matching objects, fully serialized, after the change
        results: Vec<Value>,
        deletions: Vec<usize>,
        insertions: Vec<usize>,
        modifications: Vec<usize>,
    },
    /// The observation itself failed; the registration may still be live
    Error(String),
}
