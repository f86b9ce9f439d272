//! In-memory reference backend
//!
//! A complete [`DatabaseAdapter`] over ordered in-memory collections with
//! declared schemas. This is the backend behind the integration tests and
//! the demo agent binary; it is not a storage engine.
//!
//! # Semantics
//!
//! - collections iterate in insertion order
//! - primary keys are enforced unique per collection
//! - filters use the comparison predicate language ([`crate::predicate`])
//! - change sinks fire synchronously on the mutating thread; since the
//!   server routes every mutation through its single adapter context, event
//!   delivery is single-threaded
//!
//! Sinks must not call back into the adapter: they run under the collection
//! lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use spyglass_protocol::Value;

use crate::adapter::{ChangeSink, DatabaseAdapter, Observation};
use crate::predicate::Predicate;
use crate::serializer::{serialize_document, SerializerLimits};
use crate::types::{
    ChangeEvent, DatabaseInfo, PurgeResult, QueryParams, QueryResult, SchemaInfo,
};
use crate::{AdapterError, Result};

/// In-memory database adapter
///
/// Cheap to clone; clones share the same database.
#[derive(Clone)]
pub struct MemoryAdapter {
    inner: Arc<MemoryDb>,
}

struct MemoryDb {
    name: String,
    schema_version: u64,
    limits: SerializerLimits,
    state: Mutex<State>,
    next_observer_id: AtomicU64,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
}

struct Collection {
    schema: SchemaInfo,
    rows: Vec<Row>,
    observers: Vec<Observer>,
    /// Synthetic key counter for types without a primary key
    next_row_id: u64,
}

struct Row {
    key: String,
    doc: BTreeMap<String, Value>,
}

struct Observer {
    id: u64,
    predicate: Option<Predicate>,
    sink: ChangeSink,
    /// Keys that matched this observer after the previous event
    prev_keys: Vec<String>,
}

impl MemoryAdapter {
    /// Create an empty in-memory database
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_limits(name, SerializerLimits::default())
    }

    /// Create an empty in-memory database with custom serializer limits
    pub fn with_limits(name: impl Into<String>, limits: SerializerLimits) -> Self {
        Self {
            inner: Arc::new(MemoryDb {
                name: name.into(),
                schema_version: 1,
                limits,
                state: Mutex::new(State::default()),
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }

    /// Declare an object type; replaces any previous declaration and drops
    /// its rows
    pub fn register_schema(&self, schema: SchemaInfo) {
        let mut state = self.inner.state.lock();
        state.collections.insert(
            schema.name.clone(),
            Collection {
                schema,
                rows: Vec::new(),
                observers: Vec::new(),
                next_row_id: 1,
            },
        );
    }
}

impl DatabaseAdapter for MemoryAdapter {
    fn info(&self) -> DatabaseInfo {
        let state = self.inner.state.lock();
        let object_count = state
            .collections
            .values()
            .map(|c| c.rows.len() as i64)
            .sum();
        DatabaseInfo {
            path: format!(":memory:{}", self.inner.name),
            schema_version: self.inner.schema_version,
            object_count,
            file_size: None,
            is_in_memory: true,
            is_sync_enabled: false,
        }
    }

    fn list_schemas(&self) -> Vec<SchemaInfo> {
        let state = self.inner.state.lock();
        state.collections.values().map(|c| c.schema.clone()).collect()
    }

    fn get_schema(&self, type_name: &str) -> Option<SchemaInfo> {
        let state = self.inner.state.lock();
        state.collections.get(type_name).map(|c| c.schema.clone())
    }

    fn count(&self, type_name: &str, filter: Option<&str>) -> Result<i64> {
        let state = self.inner.state.lock();
        let collection = lookup(&state, type_name)?;
        let predicate = compile_filter(filter)?;
        Ok(collection
            .rows
            .iter()
            .filter(|row| row_matches(row, predicate.as_ref()))
            .count() as i64)
    }

    fn query(&self, params: &QueryParams) -> Result<QueryResult> {
        let state = self.inner.state.lock();
        let collection = lookup(&state, &params.type_name)?;
        let predicate = compile_filter(params.filter.as_deref())?;

        let mut matching: Vec<&Row> = collection
            .rows
            .iter()
            .filter(|row| row_matches(row, predicate.as_ref()))
            .collect();
        let total_count = matching.len() as i64;

        if let Some(key_path) = params.sort_key_path.as_deref() {
            matching.sort_by(|a, b| {
                let ordering = compare_at(&a.doc, &b.doc, key_path);
                if params.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let skip = params.skip.max(0) as usize;
        let limit = params.limit.max(0) as usize;
        let documents: Vec<Value> = matching
            .iter()
            .skip(skip)
            .take(limit)
            .map(|row| serialize_row(&state, &collection.schema, row, &self.inner.limits))
            .collect();

        let has_more = (skip as i64 + documents.len() as i64) < total_count;
        Ok(QueryResult {
            documents,
            total_count,
            skip: params.skip,
            limit: params.limit,
            has_more,
        })
    }

    fn get(&self, type_name: &str, primary_key: &Value) -> Result<Option<Value>> {
        let state = self.inner.state.lock();
        let collection = lookup(&state, type_name)?;
        let key = normalize_key(primary_key)?;
        Ok(collection
            .rows
            .iter()
            .find(|row| row.key == key)
            .map(|row| serialize_row(&state, &collection.schema, row, &self.inner.limits)))
    }

    fn create(&self, type_name: &str, data: &BTreeMap<String, Value>) -> Result<Value> {
        let mut state = self.inner.state.lock();
        let collection = lookup(&state, type_name)?;
        let schema = collection.schema.clone();

        for property in data.keys() {
            if schema.property(property).is_none() {
                return Err(AdapterError::WriteFailed(format!(
                    "undeclared property '{property}' on type '{type_name}'"
                )));
            }
        }

        let key = match schema.primary_key.as_deref() {
            Some(pk) => {
                let value = data.get(pk).ok_or_else(|| {
                    AdapterError::WriteFailed(format!("missing primary key property '{pk}'"))
                })?;
                normalize_key(value)
                    .map_err(|e| AdapterError::WriteFailed(e.to_string()))?
            }
            None => {
                let collection = state.collections.get_mut(type_name).expect("looked up");
                let id = collection.next_row_id;
                collection.next_row_id += 1;
                id.to_string()
            }
        };

        let collection = state.collections.get_mut(type_name).expect("looked up");
        if collection.rows.iter().any(|row| row.key == key) {
            return Err(AdapterError::already_exists(type_name, key));
        }
        collection.rows.push(Row {
            key: key.clone(),
            doc: data.clone(),
        });

        notify(&mut state, type_name, &[key.clone()], &self.inner.limits);

        let state = &*state;
        let collection = state.collections.get(type_name).expect("looked up");
        let row = collection.rows.iter().find(|r| r.key == key).expect("just inserted");
        Ok(serialize_row(state, &schema, row, &self.inner.limits))
    }

    fn update(
        &self,
        type_name: &str,
        primary_key: &Value,
        changes: &BTreeMap<String, Value>,
    ) -> Result<Value> {
        let mut state = self.inner.state.lock();
        let collection = lookup(&state, type_name)?;
        let schema = collection.schema.clone();
        let key = normalize_key(primary_key)?;

        for property in changes.keys() {
            if schema.property(property).is_none() {
                return Err(AdapterError::property_not_found(type_name, property));
            }
            if schema.primary_key.as_deref() == Some(property) {
                return Err(AdapterError::WriteFailed(format!(
                    "cannot change primary key property '{property}'"
                )));
            }
        }

        let collection = state.collections.get_mut(type_name).expect("looked up");
        let row = collection
            .rows
            .iter_mut()
            .find(|row| row.key == key)
            .ok_or_else(|| AdapterError::not_found(type_name, &key))?;
        for (property, value) in changes {
            row.doc.insert(property.clone(), value.clone());
        }

        notify(&mut state, type_name, &[key.clone()], &self.inner.limits);

        let state = &*state;
        let collection = state.collections.get(type_name).expect("looked up");
        let row = collection.rows.iter().find(|r| r.key == key).expect("just updated");
        Ok(serialize_row(state, &schema, row, &self.inner.limits))
    }

    fn delete(&self, type_name: &str, primary_key: &Value) -> Result<bool> {
        let mut state = self.inner.state.lock();
        lookup(&state, type_name)?;
        let key = normalize_key(primary_key)?;

        let collection = state.collections.get_mut(type_name).expect("looked up");
        let position = collection
            .rows
            .iter()
            .position(|row| row.key == key)
            .ok_or_else(|| AdapterError::not_found(type_name, &key))?;
        collection.rows.remove(position);

        notify(&mut state, type_name, &[key], &self.inner.limits);
        Ok(true)
    }

    fn delete_all_in(&self, type_name: &str) -> Result<i64> {
        let mut state = self.inner.state.lock();
        lookup(&state, type_name)?;

        let collection = state.collections.get_mut(type_name).expect("looked up");
        let removed: Vec<String> = collection.rows.drain(..).map(|row| row.key).collect();
        let count = removed.len() as i64;

        if !removed.is_empty() {
            notify(&mut state, type_name, &removed, &self.inner.limits);
        }
        Ok(count)
    }

    fn delete_all(&self) -> Result<PurgeResult> {
        let mut state = self.inner.state.lock();
        let type_names: Vec<String> = state.collections.keys().cloned().collect();

        let mut cleared = Vec::new();
        let mut total_deleted = 0i64;
        for type_name in type_names {
            let collection = state.collections.get_mut(&type_name).expect("listed");
            let removed: Vec<String> = collection.rows.drain(..).map(|row| row.key).collect();
            if removed.is_empty() {
                continue;
            }
            total_deleted += removed.len() as i64;
            cleared.push(type_name.clone());
            notify(&mut state, &type_name, &removed, &self.inner.limits);
        }

        Ok(PurgeResult {
            collections_cleared: cleared.len() as i64,
            total_deleted,
            collections: cleared,
        })
    }

    fn observe(
        &self,
        type_name: &str,
        filter: Option<&str>,
        sink: ChangeSink,
    ) -> Result<Observation> {
        let mut state = self.inner.state.lock();
        lookup(&state, type_name)?;
        let predicate = compile_filter(filter)?;

        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let collection = state.collections.get_mut(type_name).expect("looked up");
        let prev_keys: Vec<String> = collection
            .rows
            .iter()
            .filter(|row| row_matches(row, predicate.as_ref()))
            .map(|row| row.key.clone())
            .collect();

        collection.observers.push(Observer {
            id,
            predicate,
            sink,
            prev_keys,
        });
        let observer = collection.observers.last().expect("just pushed");
        (observer.sink)(ChangeEvent::Initial);
        drop(state);

        let db = Arc::clone(&self.inner);
        let cancel_db = Arc::clone(&self.inner);
        let type_name = type_name.to_string();
        Ok(Observation::new(move || {
            let mut state = cancel_db.state.lock();
            if let Some(collection) = state.collections.get_mut(&type_name) {
                collection.observers.retain(|observer| observer.id != id);
            }
        })
        .with_context(Box::new(db)))
    }
}

// ============================================================================
// Internals
// ============================================================================

fn lookup<'a>(state: &'a State, type_name: &str) -> Result<&'a Collection> {
    state
        .collections
        .get(type_name)
        .ok_or_else(|| AdapterError::unknown_type(type_name))
}

fn compile_filter(filter: Option<&str>) -> Result<Option<Predicate>> {
    match filter {
        None => Ok(None),
        Some(raw) => Predicate::parse(raw)
            .map(Some)
            .map_err(|e| AdapterError::invalid_predicate(raw, e.to_string())),
    }
}

fn row_matches(row: &Row, predicate: Option<&Predicate>) -> bool {
    match predicate {
        None => true,
        Some(p) => p.matches(&Value::Object(row.doc.clone())),
    }
}

/// Render the primary-key value as the row's identity string
fn normalize_key(primary_key: &Value) -> Result<String> {
    match primary_key {
        Value::Int(i) => Ok(i.to_string()),
        Value::String(s) | Value::ObjectId(s) | Value::Uuid(s) | Value::Decimal128(s) => {
            Ok(s.clone())
        }
        other => Err(AdapterError::InvalidPrimaryKey(format!(
            "unsupported key shape: {other:?}"
        ))),
    }
}

fn serialize_row(
    state: &State,
    schema: &SchemaInfo,
    row: &Row,
    limits: &SerializerLimits,
) -> Value {
    let resolve = |name: &str| state.collections.get(name).map(|c| c.schema.clone());
    serialize_document(&row.doc, schema, &resolve, limits)
}

/// Key-path comparison for query sorting; incomparable pairs sort as equal
fn compare_at(
    a: &BTreeMap<String, Value>,
    b: &BTreeMap<String, Value>,
    key_path: &str,
) -> std::cmp::Ordering {
    let left = resolve_path(a, key_path);
    let right = resolve_path(b, key_path);
    match (left, right) {
        (Some(l), Some(r)) => compare_values(l, r),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

fn resolve_path<'a>(doc: &'a BTreeMap<String, Value>, key_path: &str) -> Option<&'a Value> {
    let mut segments = key_path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    if let (Some(l), Some(r)) = (a.as_f64(), b.as_f64()) {
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }
    if let (Some(l), Some(r)) = (a.as_str(), b.as_str()) {
        return l.cmp(r);
    }
    if let (Some(l), Some(r)) = (a.as_date(), b.as_date()) {
        return l.cmp(&r);
    }
    if let (Some(l), Some(r)) = (a.as_bool(), b.as_bool()) {
        return l.cmp(&r);
    }
    Ordering::Equal
}

/// Recompute every observer of `type_name` after a mutation that touched
/// `touched` keys, and deliver one change event per observer whose view of
/// the collection changed.
fn notify(state: &mut State, type_name: &str, touched: &[String], limits: &SerializerLimits) {
    // Compute phase: immutable borrow of the whole state so linked schemas
    // resolve during serialization
    let updates: Vec<(usize, Vec<String>, Option<ChangeEvent>)> = {
        let state = &*state;
        let collection = match state.collections.get(type_name) {
            Some(c) => c,
            None => return,
        };

        collection
            .observers
            .iter()
            .enumerate()
            .map(|(index, observer)| {
                let matching: Vec<&Row> = collection
                    .rows
                    .iter()
                    .filter(|row| row_matches(row, observer.predicate.as_ref()))
                    .collect();
                let new_keys: Vec<String> =
                    matching.iter().map(|row| row.key.clone()).collect();

                let deletions: Vec<usize> = observer
                    .prev_keys
                    .iter()
                    .enumerate()
                    .filter(|&(_, key)| !new_keys.contains(key))
                    .map(|(i, _)| i)
                    .collect();
                let insertions: Vec<usize> = new_keys
                    .iter()
                    .enumerate()
                    .filter(|&(_, key)| !observer.prev_keys.contains(key))
                    .map(|(i, _)| i)
                    .collect();
                let modifications: Vec<usize> = new_keys
                    .iter()
                    .enumerate()
                    .filter(|&(_, key)| {
                        observer.prev_keys.contains(key) && touched.contains(key)
                    })
                    .map(|(i, _)| i)
                    .collect();

                let event = if deletions.is_empty()
                    && insertions.is_empty()
                    && modifications.is_empty()
                {
                    None
                } else {
                    let results: Vec<Value> = matching
                        .iter()
                        .map(|row| serialize_row(state, &collection.schema, row, limits))
                        .collect();
                    Some(ChangeEvent::Update {
                        results,
                        deletions,
                        insertions,
                        modifications,
                    })
                };

                (index, new_keys, event)
            })
            .collect()
    };

    // Apply phase: update observer bookkeeping and fire sinks
    let collection = match state.collections.get_mut(type_name) {
        Some(c) => c,
        None => return,
    };
    for (index, new_keys, event) in updates {
        let observer = &mut collection.observers[index];
        observer.prev_keys = new_keys;
        if let Some(event) = event {
            (observer.sink)(event);
        }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
