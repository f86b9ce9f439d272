//! Demo database for the standalone agent

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use spyglass_adapter::memory::MemoryAdapter;
use spyglass_adapter::{
    DatabaseAdapter, PropertyInfo, PropertyType, SchemaInfo, SerializerLimits,
};
use spyglass_protocol::Value;

/// An in-memory database with a small social-app shape
pub fn demo_adapter(limits: SerializerLimits) -> MemoryAdapter {
    let adapter = MemoryAdapter::with_limits("demo", limits);

    adapter.register_schema(SchemaInfo {
        name: "User".into(),
        primary_key: Some("id".into()),
        properties: vec![
            PropertyInfo::new("id", PropertyType::Int).primary_key(),
            PropertyInfo::new("name", PropertyType::String),
            PropertyInfo::new("email", PropertyType::String).indexed(),
            PropertyInfo::new("age", PropertyType::Int).optional(),
            PropertyInfo::new("createdAt", PropertyType::Date),
        ],
        is_embedded: false,
    });

    adapter.register_schema(SchemaInfo {
        name: "Post".into(),
        primary_key: Some("id".into()),
        properties: vec![
            PropertyInfo::new("id", PropertyType::ObjectId).primary_key(),
            PropertyInfo::new("title", PropertyType::String),
            PropertyInfo::new("likes", PropertyType::Int),
            PropertyInfo::new("author", PropertyType::Link("User".into()))
                .optional(),
        ],
        is_embedded: false,
    });

    seed(&adapter);
    adapter
}

fn seed(adapter: &MemoryAdapter) {
    let users = [
        (1, "Ada Lovelace", "ada@example.com", 36),
        (2, "Grace Hopper", "grace@example.com", 45),
        (3, "Alan Turing", "alan@example.com", 41),
    ];
    for (id, name, email, age) in users {
        let mut doc = BTreeMap::new();
        doc.insert("id".to_string(), Value::Int(id));
        doc.insert("name".to_string(), Value::from(name));
        doc.insert("email".to_string(), Value::from(email));
        doc.insert("age".to_string(), Value::Int(age));
        doc.insert(
            "createdAt".to_string(),
            Value::Date(Utc.with_ymd_and_hms(2024, 1, id as u32, 9, 0, 0).unwrap()),
        );
        if let Err(e) = adapter.create("User", &doc) {
            tracing::warn!(error = %e, "failed to seed user");
        }
    }

    let posts = [
        ("6500a1b2c3d4e5f6a7b8c9d0", "Notes on the Analytical Engine", 42),
        ("6500a1b2c3d4e5f6a7b8c9d1", "Compilers considered helpful", 17),
    ];
    for (id, title, likes) in posts {
        let mut doc = BTreeMap::new();
        doc.insert("id".to_string(), Value::ObjectId(id.into()));
        doc.insert("title".to_string(), Value::from(title));
        doc.insert("likes".to_string(), Value::Int(likes));
        if let Err(e) = adapter.create("Post", &doc) {
            tracing::warn!(error = %e, "failed to seed post");
        }
    }
}
