//! Tests for the in-memory backend

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use spyglass_protocol::Value;

use super::MemoryAdapter;
use crate::types::{ChangeEvent, PropertyInfo, PropertyType, QueryParams, SchemaInfo};
use crate::{AdapterError, DatabaseAdapter};

fn user_schema() -> SchemaInfo {
    SchemaInfo {
        name: "User".into(),
        primary_key: Some("id".into()),
        properties: vec![
            PropertyInfo::new("id", PropertyType::Int).primary_key(),
            PropertyInfo::new("name", PropertyType::String),
            PropertyInfo::new("age", PropertyType::Int).optional(),
        ],
        is_embedded: false,
    }
}

fn adapter() -> MemoryAdapter {
    let adapter = MemoryAdapter::new("test");
    adapter.register_schema(user_schema());
    adapter
}

fn user(id: i64, name: &str, age: i64) -> BTreeMap<String, Value> {
    let mut doc = BTreeMap::new();
    doc.insert("id".to_string(), Value::Int(id));
    doc.insert("name".to_string(), Value::from(name));
    doc.insert("age".to_string(), Value::Int(age));
    doc
}

/// Sink that records every event it receives
fn recording_sink() -> (super::ChangeSink, Arc<Mutex<Vec<ChangeEvent>>>) {
    let events: Arc<Mutex<Vec<ChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let sink: super::ChangeSink = Box::new(move |event| captured.lock().push(event));
    (sink, events)
}

// ============================================================================
// Introspection
// ============================================================================

#[test]
fn test_info_reports_in_memory() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    let info = adapter.info();
    assert!(info.is_in_memory);
    assert!(!info.is_sync_enabled);
    assert_eq!(info.object_count, 1);
    assert_eq!(info.file_size, None);
}

#[test]
fn test_schema_listing() {
    let adapter = adapter();
    let schemas = adapter.list_schemas();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].name, "User");

    assert!(adapter.get_schema("User").is_some());
    assert!(adapter.get_schema("Nope").is_none());
}

// ============================================================================
// CRUD
// ============================================================================

#[test]
fn test_create_and_get() {
    let adapter = adapter();
    let created = adapter.create("User", &user(1, "ada", 36)).unwrap();
    assert_eq!(created.get("name"), Some(&Value::from("ada")));

    let fetched = adapter.get("User", &Value::Int(1)).unwrap().unwrap();
    assert_eq!(fetched, created);

    assert!(adapter.get("User", &Value::Int(99)).unwrap().is_none());
}

#[test]
fn test_create_duplicate_key() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    let err = adapter.create("User", &user(1, "grace", 30)).unwrap_err();
    assert!(matches!(err, AdapterError::AlreadyExists { .. }));
}

#[test]
fn test_create_undeclared_property() {
    let adapter = adapter();
    let mut doc = user(1, "ada", 36);
    doc.insert("shoeSize".to_string(), Value::Int(42));

    let err = adapter.create("User", &doc).unwrap_err();
    assert!(matches!(err, AdapterError::WriteFailed(_)));
}

#[test]
fn test_unknown_type_everywhere() {
    let adapter = adapter();
    assert!(matches!(
        adapter.count("Ghost", None).unwrap_err(),
        AdapterError::UnknownType(_)
    ));
    assert!(matches!(
        adapter.get("Ghost", &Value::Int(1)).unwrap_err(),
        AdapterError::UnknownType(_)
    ));
    assert!(matches!(
        adapter.delete_all_in("Ghost").unwrap_err(),
        AdapterError::UnknownType(_)
    ));
}

#[test]
fn test_update() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    let mut changes = BTreeMap::new();
    changes.insert("age".to_string(), Value::Int(37));
    let updated = adapter.update("User", &Value::Int(1), &changes).unwrap();
    assert_eq!(updated.get("age"), Some(&Value::Int(37)));
    assert_eq!(updated.get("name"), Some(&Value::from("ada")));
}

#[test]
fn test_update_undeclared_property() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    let mut changes = BTreeMap::new();
    changes.insert("shoeSize".to_string(), Value::Int(42));
    let err = adapter.update("User", &Value::Int(1), &changes).unwrap_err();
    assert!(matches!(err, AdapterError::PropertyNotFound { .. }));
}

#[test]
fn test_update_missing_object() {
    let adapter = adapter();
    let mut changes = BTreeMap::new();
    changes.insert("age".to_string(), Value::Int(1));
    let err = adapter.update("User", &Value::Int(9), &changes).unwrap_err();
    assert!(matches!(err, AdapterError::NotFound { .. }));
}

#[test]
fn test_delete() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    assert!(adapter.delete("User", &Value::Int(1)).unwrap());
    assert!(adapter.get("User", &Value::Int(1)).unwrap().is_none());

    let err = adapter.delete("User", &Value::Int(1)).unwrap_err();
    assert!(matches!(err, AdapterError::NotFound { .. }));
}

#[test]
fn test_invalid_primary_key_shape() {
    let adapter = adapter();
    let err = adapter.get("User", &Value::Bool(true)).unwrap_err();
    assert!(matches!(err, AdapterError::InvalidPrimaryKey(_)));
}

// ============================================================================
// Query
// ============================================================================

#[test]
fn test_query_pagination() {
    let adapter = adapter();
    for i in 0..125 {
        adapter.create("User", &user(i, "u", i)).unwrap();
    }

    let mut params = QueryParams::new("User");
    params.limit = 50;
    params.skip = 100;
    let page = adapter.query(&params).unwrap();

    assert_eq!(page.documents.len(), 25);
    assert_eq!(page.total_count, 125);
    assert!(!page.has_more);

    params.skip = 0;
    let page = adapter.query(&params).unwrap();
    assert_eq!(page.documents.len(), 50);
    assert!(page.has_more);
}

#[test]
fn test_query_limit_zero() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    let mut params = QueryParams::new("User");
    params.limit = 0;
    let page = adapter.query(&params).unwrap();

    assert!(page.documents.is_empty());
    assert_eq!(page.total_count, 1);
}

#[test]
fn test_query_skip_past_end() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    let mut params = QueryParams::new("User");
    params.skip = 10;
    let page = adapter.query(&params).unwrap();

    assert!(page.documents.is_empty());
    assert!(!page.has_more);
}

#[test]
fn test_query_filter_and_sort() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();
    adapter.create("User", &user(2, "grace", 30)).unwrap();
    adapter.create("User", &user(3, "alan", 41)).unwrap();

    let mut params = QueryParams::new("User");
    params.filter = Some("age >= 31".into());
    params.sort_key_path = Some("age".into());
    params.ascending = false;
    let page = adapter.query(&params).unwrap();

    let names: Vec<_> = page
        .documents
        .iter()
        .map(|d| d.get("name").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["alan", "ada"]);
}

#[test]
fn test_invalid_predicate_surfaces() {
    let adapter = adapter();
    let err = adapter.count("User", Some("???")).unwrap_err();
    assert!(matches!(err, AdapterError::InvalidPredicate { .. }));

    let mut params = QueryParams::new("User");
    params.filter = Some("???".into());
    assert!(matches!(
        adapter.query(&params).unwrap_err(),
        AdapterError::InvalidPredicate { .. }
    ));
}

// ============================================================================
// Purge
// ============================================================================

#[test]
fn test_delete_all_in_collection() {
    let adapter = adapter();
    for i in 0..3 {
        adapter.create("User", &user(i, "u", i)).unwrap();
    }

    assert_eq!(adapter.delete_all_in("User").unwrap(), 3);
    assert_eq!(adapter.count("User", None).unwrap(), 0);
}

#[test]
fn test_delete_all_empty_database() {
    let adapter = adapter();
    let purge = adapter.delete_all().unwrap();

    assert_eq!(purge.total_deleted, 0);
    assert_eq!(purge.collections_cleared, 0);
    assert!(purge.collections.is_empty());
}

#[test]
fn test_delete_all() {
    let adapter = adapter();
    for i in 0..4 {
        adapter.create("User", &user(i, "u", i)).unwrap();
    }

    let purge = adapter.delete_all().unwrap();
    assert_eq!(purge.total_deleted, 4);
    assert_eq!(purge.collections_cleared, 1);
    assert_eq!(purge.collections, vec!["User".to_string()]);
}

// ============================================================================
// Observation
// ============================================================================

fn update_events(events: &Arc<Mutex<Vec<ChangeEvent>>>) -> Vec<(usize, usize, usize)> {
    events
        .lock()
        .iter()
        .filter_map(|event| match event {
            ChangeEvent::Update {
                insertions,
                modifications,
                deletions,
                ..
            } => Some((insertions.len(), modifications.len(), deletions.len())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_observe_fires_initial_without_diff() {
    let adapter = adapter();
    let (sink, events) = recording_sink();
    let observation = adapter.observe("User", None, sink).unwrap();

    assert!(matches!(events.lock()[0], ChangeEvent::Initial));
    assert_eq!(update_events(&events).len(), 0);
    observation.cancel();
}

#[test]
fn test_observe_create_update_delete() {
    let adapter = adapter();
    let (sink, events) = recording_sink();
    let _observation = adapter.observe("User", None, sink).unwrap();

    adapter.create("User", &user(1, "ada", 36)).unwrap();
    let mut changes = BTreeMap::new();
    changes.insert("age".to_string(), Value::Int(37));
    adapter.update("User", &Value::Int(1), &changes).unwrap();
    adapter.delete("User", &Value::Int(1)).unwrap();

    // (insertions, modifications, deletions) per event
    assert_eq!(update_events(&events), vec![(1, 0, 0), (0, 1, 0), (0, 0, 1)]);
}

#[test]
fn test_observe_deletion_reports_predelete_ordinal() {
    let adapter = adapter();
    adapter.create("User", &user(1, "ada", 36)).unwrap();
    adapter.create("User", &user(2, "grace", 30)).unwrap();
    adapter.create("User", &user(3, "alan", 41)).unwrap();

    let (sink, events) = recording_sink();
    let _observation = adapter.observe("User", None, sink).unwrap();

    adapter.delete("User", &Value::Int(2)).unwrap();

    let deletions: Vec<usize> = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            ChangeEvent::Update { deletions, .. } => Some(deletions.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    // grace was the second row before the delete
    assert_eq!(deletions, vec![1]);
}

#[test]
fn test_filtered_observer_only_sees_matches() {
    let adapter = adapter();
    let (sink, events) = recording_sink();
    let _observation = adapter.observe("User", Some("age > 40"), sink).unwrap();

    adapter.create("User", &user(1, "ada", 36)).unwrap();
    assert_eq!(update_events(&events).len(), 0);

    adapter.create("User", &user(2, "alan", 41)).unwrap();
    assert_eq!(update_events(&events), vec![(1, 0, 0)]);

    // Updating ada below the threshold still changes nothing for this observer
    let mut changes = BTreeMap::new();
    changes.insert("age".to_string(), Value::Int(37));
    adapter.update("User", &Value::Int(1), &changes).unwrap();
    assert_eq!(update_events(&events).len(), 1);
}

#[test]
fn test_update_moving_row_out_of_filter_is_a_deletion() {
    let adapter = adapter();
    adapter.create("User", &user(1, "alan", 41)).unwrap();

    let (sink, events) = recording_sink();
    let _observation = adapter.observe("User", Some("age > 40"), sink).unwrap();

    let mut changes = BTreeMap::new();
    changes.insert("age".to_string(), Value::Int(20));
    adapter.update("User", &Value::Int(1), &changes).unwrap();

    assert_eq!(update_events(&events), vec![(0, 0, 1)]);
}

#[test]
fn test_cancelled_observation_stops_delivering() {
    let adapter = adapter();
    let (sink, events) = recording_sink();
    let observation = adapter.observe("User", None, sink).unwrap();

    observation.cancel();
    adapter.create("User", &user(1, "ada", 36)).unwrap();

    assert_eq!(update_events(&events).len(), 0);
}

#[test]
fn test_observe_unknown_type_and_bad_filter() {
    let adapter = adapter();
    let (sink, _) = recording_sink();
    assert!(matches!(
        adapter.observe("Ghost", None, sink).unwrap_err(),
        AdapterError::UnknownType(_)
    ));

    let (sink, _) = recording_sink();
    assert!(matches!(
        adapter.observe("User", Some("???"), sink).unwrap_err(),
        AdapterError::InvalidPredicate { .. }
    ));
}
