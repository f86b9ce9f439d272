//! Tests for object-graph serialization limits

use std::collections::BTreeMap;

use spyglass_protocol::Value;

use super::{serialize_document, SerializerLimits};
use crate::types::{PropertyInfo, PropertyType, SchemaInfo};

fn user_schema() -> SchemaInfo {
    SchemaInfo {
        name: "User".into(),
        primary_key: Some("id".into()),
        properties: vec![
            PropertyInfo::new("id", PropertyType::Int).primary_key(),
            PropertyInfo::new("name", PropertyType::String),
            PropertyInfo::new("bestFriend", PropertyType::Link("User".into())).optional(),
            PropertyInfo::new("followers", PropertyType::LinkingObjects("User".into())),
        ],
        is_embedded: false,
    }
}

fn resolver(name: &str) -> Option<SchemaInfo> {
    (name == "User").then(user_schema)
}

fn user(id: i64, name: &str) -> BTreeMap<String, Value> {
    let mut doc = BTreeMap::new();
    doc.insert("id".to_string(), Value::Int(id));
    doc.insert("name".to_string(), Value::from(name));
    doc
}

#[test]
fn test_scalars_pass_through() {
    let doc = user(1, "ada");
    let out = serialize_document(&doc, &user_schema(), &resolver, &SerializerLimits::default());

    assert_eq!(out.get("id"), Some(&Value::Int(1)));
    assert_eq!(out.get("name"), Some(&Value::from("ada")));
}

#[test]
fn test_shallow_link_renders_inline() {
    let mut doc = user(1, "ada");
    doc.insert("bestFriend".to_string(), Value::Object(user(2, "grace")));

    let out = serialize_document(&doc, &user_schema(), &resolver, &SerializerLimits::default());

    let friend = out.get("bestFriend").unwrap();
    assert_eq!(friend.get("name"), Some(&Value::from("grace")));
}

#[test]
fn test_deep_link_collapses_to_reference() {
    // ada -> grace -> alan -> kurt, deeper than max_depth = 2
    let mut kurt = user(4, "kurt");
    kurt.insert("id".to_string(), Value::Int(4));
    let mut alan = user(3, "alan");
    alan.insert("bestFriend".to_string(), Value::Object(kurt));
    let mut grace = user(2, "grace");
    grace.insert("bestFriend".to_string(), Value::Object(alan));
    let mut ada = user(1, "ada");
    ada.insert("bestFriend".to_string(), Value::Object(grace));

    let limits = SerializerLimits {
        max_depth: 2,
        max_list_items: 100,
    };
    let out = serialize_document(&ada, &user_schema(), &resolver, &limits);

    let grace_out = out.get("bestFriend").unwrap();
    assert_eq!(grace_out.get("name"), Some(&Value::from("grace")));

    let alan_out = grace_out.get("bestFriend").unwrap();
    assert_eq!(alan_out.get("_type"), Some(&Value::from("Reference")));
    assert_eq!(alan_out.get("_typeName"), Some(&Value::from("User")));
    assert_eq!(alan_out.get("_id"), Some(&Value::Int(3)));
}

#[test]
fn test_linking_objects_wire_form_and_truncation() {
    let mut doc = user(1, "ada");
    let followers: Vec<Value> = (2..7).map(|i| Value::Object(user(i, "f"))).collect();
    doc.insert("followers".to_string(), Value::List(followers));

    let limits = SerializerLimits {
        max_depth: 3,
        max_list_items: 3,
    };
    let out = serialize_document(&doc, &user_schema(), &resolver, &limits);

    let followers = out.get("followers").unwrap();
    assert_eq!(followers.get("_type"), Some(&Value::from("LinkingObjects")));
    assert_eq!(followers.get("_count"), Some(&Value::Int(5)));
    assert_eq!(followers.get("_truncated"), Some(&Value::Bool(true)));
    assert_eq!(followers.get("_items").unwrap().as_seq().unwrap().len(), 3);
}

#[test]
fn test_plain_nested_object_past_depth_is_marked() {
    let mut level3 = BTreeMap::new();
    level3.insert("x".to_string(), Value::Int(1));
    let mut level2 = BTreeMap::new();
    level2.insert("inner".to_string(), Value::Object(level3));
    let mut level1 = BTreeMap::new();
    level1.insert("inner".to_string(), Value::Object(level2));
    let mut doc = user(1, "ada");
    doc.insert("blob".to_string(), Value::Object(level1));

    let limits = SerializerLimits {
        max_depth: 2,
        max_list_items: 100,
    };
    let out = serialize_document(&doc, &user_schema(), &resolver, &limits);

    let marked = out
        .get("blob")
        .and_then(|v| v.get("inner"))
        .and_then(|v| v.get("inner"))
        .unwrap();
    assert_eq!(marked.get("_truncated"), Some(&Value::Bool(true)));
}

#[test]
fn test_plain_lists_are_capped() {
    let mut doc = user(1, "ada");
    doc.insert(
        "tags".to_string(),
        Value::List((0..10).map(Value::Int).collect()),
    );

    let limits = SerializerLimits {
        max_depth: 3,
        max_list_items: 4,
    };
    let out = serialize_document(&doc, &user_schema(), &resolver, &limits);

    assert_eq!(out.get("tags").unwrap().as_seq().unwrap().len(), 4);
}
