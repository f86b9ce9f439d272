//! Object-graph serialization with depth and list limits
//!
//! Inspector documents can reference other objects, and object graphs can be
//! cyclic. The serializer bounds what goes on the wire:
//!
//! - linked objects render inline up to `max_depth`, then collapse into a
//!   `Reference` wire form carrying the target type and primary key
//! - `LinkingObjects` collections always render as their wire form, with
//!   `_items` capped at `max_list_items` and `_truncated` set when capped
//! - plain nested objects past the depth limit collapse into a
//!   `{"_truncated": true}` marker

use std::collections::BTreeMap;

use spyglass_protocol::Value;

use crate::types::{PropertyType, SchemaInfo};

/// Limits applied when serializing an object graph
#[derive(Debug, Clone, Copy)]
pub struct SerializerLimits {
    pub max_depth: u32,
    pub max_list_items: usize,
}

impl Default for SerializerLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_list_items: 100,
        }
    }
}

/// Schema lookup used to resolve link targets
pub type SchemaResolver<'a> = dyn Fn(&str) -> Option<SchemaInfo> + 'a;

/// Serialize one document of `schema` for the wire
pub fn serialize_document(
    doc: &BTreeMap<String, Value>,
    schema: &SchemaInfo,
    resolve: &SchemaResolver<'_>,
    limits: &SerializerLimits,
) -> Value {
    serialize_object(doc, Some(schema), resolve, limits, 0)
}

fn serialize_object(
    doc: &BTreeMap<String, Value>,
    schema: Option<&SchemaInfo>,
    resolve: &SchemaResolver<'_>,
    limits: &SerializerLimits,
    depth: u32,
) -> Value {
    let mut out = BTreeMap::new();
    for (name, value) in doc {
        let property_type = schema.and_then(|s| s.property(name)).map(|p| &p.property_type);
        out.insert(
            name.clone(),
            serialize_property(value, property_type, resolve, limits, depth),
        );
    }
    Value::Object(out)
}

fn serialize_property(
    value: &Value,
    property_type: Option<&PropertyType>,
    resolve: &SchemaResolver<'_>,
    limits: &SerializerLimits,
    depth: u32,
) -> Value {
    match property_type {
        Some(PropertyType::Link(target)) => serialize_link(value, target, resolve, limits, depth),
        Some(PropertyType::LinkingObjects(target)) => {
            serialize_linking_objects(value, target, resolve, limits, depth)
        }
        _ => serialize_value(value, resolve, limits, depth),
    }
}

fn serialize_value(
    value: &Value,
    resolve: &SchemaResolver<'_>,
    limits: &SerializerLimits,
    depth: u32,
) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= limits.max_depth {
                return truncation_marker();
            }
            serialize_object(map, None, resolve, limits, depth + 1)
        }
        Value::List(items) => {
            let capped = items.iter().take(limits.max_list_items);
            Value::List(
                capped
                    .map(|item| serialize_value(item, resolve, limits, depth))
                    .collect(),
            )
        }
        scalar => scalar.clone(),
    }
}

fn serialize_link(
    value: &Value,
    target: &str,
    resolve: &SchemaResolver<'_>,
    limits: &SerializerLimits,
    depth: u32,
) -> Value {
    let map = match value {
        Value::Object(map) => map,
        // A bare key or null stands in for the linked object
        other => return other.clone(),
    };

    let target_schema = resolve(target);
    if depth + 1 >= limits.max_depth {
        return reference_form(target, map, target_schema.as_ref());
    }

    serialize_object(map, target_schema.as_ref(), resolve, limits, depth + 1)
}

fn serialize_linking_objects(
    value: &Value,
    target: &str,
    resolve: &SchemaResolver<'_>,
    limits: &SerializerLimits,
    depth: u32,
) -> Value {
    let items: &[Value] = match value {
        Value::List(items) => items,
        Value::Null => &[],
        other => return other.clone(),
    };

    let truncated = items.len() > limits.max_list_items;
    let rendered: Vec<Value> = items
        .iter()
        .take(limits.max_list_items)
        .map(|item| serialize_link(item, target, resolve, limits, depth))
        .collect();

    let mut out = BTreeMap::new();
    out.insert("_type".to_string(), Value::from("LinkingObjects"));
    out.insert("_count".to_string(), Value::Int(items.len() as i64));
    out.insert("_items".to_string(), Value::List(rendered));
    out.insert("_truncated".to_string(), Value::Bool(truncated));
    Value::Object(out)
}

/// Collapse a linked object into its reference wire form
fn reference_form(
    target: &str,
    map: &BTreeMap<String, Value>,
    target_schema: Option<&SchemaInfo>,
) -> Value {
    let id = target_schema
        .and_then(|s| s.primary_key.as_deref())
        .and_then(|pk| map.get(pk))
        .cloned()
        .unwrap_or(Value::Null);

    let mut out = BTreeMap::new();
    out.insert("_type".to_string(), Value::from("Reference"));
    out.insert("_typeName".to_string(), Value::from(target));
    out.insert("_id".to_string(), id);
    Value::Object(out)
}

fn truncation_marker() -> Value {
    let mut out = BTreeMap::new();
    out.insert("_truncated".to_string(), Value::Bool(true));
    Value::Object(out)
}

#[cfg(test)]
#[path = "serializer_test.rs"]
mod tests;
