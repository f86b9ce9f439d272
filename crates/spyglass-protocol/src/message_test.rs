//! Tests for the message envelope

use std::collections::BTreeMap;

use super::*;

// ============================================================================
// Envelope shape
// ============================================================================

#[test]
fn test_request_envelope_shape() {
    let req = Request::new("r1", RequestKind::Ping);
    let json = serde_json::to_value(Message::Request(req)).unwrap();

    assert_eq!(json["type"], "request");
    assert_eq!(json["payload"]["id"], "r1");
    assert_eq!(json["payload"]["type"], "ping");
    // No params key when params are absent
    assert!(json["payload"].get("params").is_none());
}

#[test]
fn test_request_kind_tags() {
    let cases = [
        (RequestKind::Ping, "ping"),
        (RequestKind::GetRealmInfo, "getRealmInfo"),
        (RequestKind::ListSchemas, "listSchemas"),
        (RequestKind::GetSchema, "getSchema"),
        (RequestKind::QueryDocuments, "queryDocuments"),
        (RequestKind::GetDocument, "getDocument"),
        (RequestKind::CountDocuments, "countDocuments"),
        (RequestKind::CreateDocument, "createDocument"),
        (RequestKind::UpdateDocument, "updateDocument"),
        (RequestKind::DeleteDocument, "deleteDocument"),
        (RequestKind::DeleteAllInCollection, "deleteAllInCollection"),
        (RequestKind::DeleteAllInDatabase, "deleteAllInDatabase"),
        (RequestKind::Subscribe, "subscribe"),
        (RequestKind::Unsubscribe, "unsubscribe"),
    ];

    for (kind, tag) in cases {
        assert_eq!(serde_json::to_value(kind).unwrap(), tag);
    }
}

#[test]
fn test_unknown_request_kind_is_a_decode_error() {
    let raw = r#"{"id":"r1","type":"formatDisk"}"#;
    let result: std::result::Result<Request, _> = serde_json::from_str(raw);
    assert!(result.is_err());
}

#[test]
fn test_response_always_carries_both_data_and_error() {
    let ok = Response::ok("r1", Value::Bool(true));
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], true);
    assert_eq!(json["error"], serde_json::Value::Null);

    let fail = Response::fail("r2", "boom");
    let json = serde_json::to_value(&fail).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["data"], serde_json::Value::Null);
    assert_eq!(json["error"], "boom");
}

#[test]
fn test_response_timestamp_is_iso_with_millis() {
    let res = Response::ok("r1", Value::Null);
    // e.g. 2024-03-01T12:30:45.123Z
    assert!(res.timestamp.ends_with('Z'));
    assert!(res.timestamp.contains('.'));
    assert!(chrono::DateTime::parse_from_rfc3339(&res.timestamp).is_ok());
}

#[test]
fn test_notification_envelope_shape() {
    let changes = ChangeSet {
        insertions: vec![Value::from("doc")],
        modifications: vec![],
        deletions: vec!["3".to_string()],
    };
    let n = Notification::new("sub-1", "User", changes);
    let json = serde_json::to_value(Message::Notification(n)).unwrap();

    assert_eq!(json["type"], "notification");
    assert_eq!(json["payload"]["subscriptionId"], "sub-1");
    assert_eq!(json["payload"]["typeName"], "User");
    assert_eq!(json["payload"]["changes"]["deletions"][0], "3");
}

// ============================================================================
// Params access
// ============================================================================

#[test]
fn test_param_lookup() {
    let mut params = BTreeMap::new();
    params.insert("typeName".to_string(), Value::from("User"));
    let req = Request::with_params("r1", RequestKind::GetSchema, params);

    assert_eq!(req.param("typeName"), Some(&Value::from("User")));
    assert_eq!(req.param("missing"), None);

    let bare = Request::new("r2", RequestKind::Ping);
    assert_eq!(bare.param("typeName"), None);
}

#[test]
fn test_params_decode_typed_wire_forms() {
    let raw = r#"{
        "id": "r4",
        "type": "getDocument",
        "params": {
            "typeName": "User",
            "primaryKey": {"_type": "ObjectId", "value": "6500a1b2c3d4e5f6a7b8c9d0"}
        }
    }"#;

    let req: Request = serde_json::from_str(raw).unwrap();
    assert_eq!(
        req.param("primaryKey"),
        Some(&Value::ObjectId("6500a1b2c3d4e5f6a7b8c9d0".into()))
    );
}

// ============================================================================
// ChangeSet
// ============================================================================

#[test]
fn test_changeset_is_empty() {
    assert!(ChangeSet::default().is_empty());

    let non_empty = ChangeSet {
        insertions: vec![],
        modifications: vec![],
        deletions: vec!["0".into()],
    };
    assert!(!non_empty.is_empty());
}

// ============================================================================
// Roundtrips
// ============================================================================

#[test]
fn test_message_roundtrip() {
    let mut params = BTreeMap::new();
    params.insert("typeName".to_string(), Value::from("User"));
    params.insert("limit".to_string(), Value::Int(50));

    let messages = vec![
        Message::Request(Request::with_params("r1", RequestKind::QueryDocuments, params)),
        Message::Response(Response::fail("r2", "Schema 'Nope' not found")),
        Message::Notification(Notification::new("s1", "User", ChangeSet::default())),
    ];

    for msg in messages {
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}

#[test]
fn test_unknown_envelope_keys_are_ignored() {
    let raw = r#"{
        "type": "request",
        "payload": {"id": "r1", "type": "ping", "extra": 1},
        "trailer": true
    }"#;

    let msg = decode(raw.as_bytes()).unwrap();
    assert_eq!(msg, Message::Request(Request::new("r1", RequestKind::Ping)));
}
