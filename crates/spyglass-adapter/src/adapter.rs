//! The `DatabaseAdapter` trait and observation handles

use std::any::Any;
use std::collections::BTreeMap;

use spyglass_protocol::Value;

use crate::types::{
    ChangeEvent, DatabaseInfo, PurgeResult, QueryParams, QueryResult, SchemaInfo,
};
use crate::Result;

/// Callback receiving change events for one observation
pub type ChangeSink = Box<dyn Fn(ChangeEvent) + Send + Sync>;

/// A live registration with the adapter's change feed
///
/// Owns the two halves of a registration's lifetime:
///
/// - a cancellation token, invoked exactly once via [`cancel`](Self::cancel)
///   (or on drop, as a safety net)
/// - an opaque context handle keeping the observing database handle alive
///   for the registration's lifetime
pub struct Observation {
    cancel: Option<Box<dyn FnOnce() + Send>>,
    _context: Option<Box<dyn Any + Send>>,
}

impl Observation {
    /// Create an observation with the given cancellation action
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
            _context: None,
        }
    }

    /// Attach the adapter-owned context that must outlive the registration
    pub fn with_context(mut self, context: Box<dyn Any + Send>) -> Self {
        self._context = Some(context);
        self
    }

    /// Invalidate the registration; no events are delivered afterwards
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// The narrow contract the inspector server requires of a database engine
///
/// # Calling convention
///
/// Every method is invoked from one dedicated execution context owned by the
/// server; implementations may assume single-threaded access for reads and
/// writes. `observe` must deliver events on a single dedicated thread (or
/// cooperative task); observations registered from other threads are not
/// required to fire.
pub trait DatabaseAdapter: Send + Sync + 'static {
    /// Summary of the open database
    fn info(&self) -> DatabaseInfo;

    /// All declared object types
    fn list_schemas(&self) -> Vec<SchemaInfo>;

    /// Schema of one type, absent when unknown
    fn get_schema(&self, type_name: &str) -> Option<SchemaInfo>;

    /// Count objects of a type, optionally filtered
    fn count(&self, type_name: &str, filter: Option<&str>) -> Result<i64>;

    /// Paginated query
    fn query(&self, params: &QueryParams) -> Result<QueryResult>;

    /// Read one object by primary key; absent when no such object exists
    fn get(&self, type_name: &str, primary_key: &Value) -> Result<Option<Value>>;

    /// Insert a new object; returns it fully serialized
    fn create(&self, type_name: &str, data: &BTreeMap<String, Value>) -> Result<Value>;

    /// Apply property changes to one object; returns the updated object
    fn update(
        &self,
        type_name: &str,
        primary_key: &Value,
        changes: &BTreeMap<String, Value>,
    ) -> Result<Value>;

    /// Delete one object by primary key
    fn delete(&self, type_name: &str, primary_key: &Value) -> Result<bool>;

    /// Delete every object of one type; returns the deleted count
    fn delete_all_in(&self, type_name: &str) -> Result<i64>;

    /// Delete every object in the database
    fn delete_all(&self) -> Result<PurgeResult>;

    /// Register a live observation of one type
    ///
    /// The sink receives an `Initial` event on registration, then an
    /// `Update` per relevant change until the returned observation is
    /// cancelled.
    fn observe(&self, type_name: &str, filter: Option<&str>, sink: ChangeSink)
        -> Result<Observation>;
}
