//! Tests for the subscription manager

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use spyglass_adapter::memory::MemoryAdapter;
use spyglass_adapter::{PropertyInfo, PropertyType, SchemaInfo};
use spyglass_protocol::{
    Message, Notification, Request, RequestKind, Response, Value, LENGTH_PREFIX_SIZE,
};

use super::SubscriptionManager;
use crate::client::{ClientHandle, ClientState, Outgoing};
use crate::context::AdapterContext;

struct Fixture {
    adapter: MemoryAdapter,
    context: Arc<AdapterContext>,
    manager: Arc<SubscriptionManager>,
    client: ClientHandle,
    outbox: tokio::sync::mpsc::UnboundedReceiver<Outgoing>,
}

fn fixture() -> Fixture {
    let adapter = MemoryAdapter::new("sub-test");
    adapter.register_schema(SchemaInfo {
        name: "User".into(),
        primary_key: Some("id".into()),
        properties: vec![
            PropertyInfo::new("id", PropertyType::Int).primary_key(),
            PropertyInfo::new("name", PropertyType::String),
        ],
        is_embedded: false,
    });

    let context = AdapterContext::spawn(Arc::new(adapter.clone()));
    let manager = SubscriptionManager::new(Arc::clone(&context));
    let (client, outbox) = ClientHandle::new(1024 * 1024);
    client.transition(ClientState::Ready);

    Fixture {
        adapter,
        context,
        manager,
        client,
        outbox,
    }
}

fn subscribe_request(id: &str, type_name: &str) -> Request {
    let mut params = BTreeMap::new();
    params.insert("typeName".to_string(), Value::from(type_name));
    Request::with_params(id, RequestKind::Subscribe, params)
}

fn unsubscribe_request(id: &str, subscription_id: &str) -> Request {
    let mut params = BTreeMap::new();
    params.insert(
        "subscriptionId".to_string(),
        Value::from(subscription_id),
    );
    Request::with_params(id, RequestKind::Unsubscribe, params)
}

/// Decode all frames currently queued for the client, in order
fn drain_outbox(fixture: &mut Fixture) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(item) = fixture.outbox.try_recv() {
        if let Outgoing::Frame(frame) = item {
            messages.push(spyglass_protocol::decode(&frame[LENGTH_PREFIX_SIZE..]).unwrap());
        }
    }
    messages
}

fn expect_response(message: &Message) -> &Response {
    match message {
        Message::Response(response) => response,
        other => panic!("expected response, got {other:?}"),
    }
}

fn expect_notification(message: &Message) -> &Notification {
    match message {
        Message::Notification(notification) => notification,
        other => panic!("expected notification, got {other:?}"),
    }
}

async fn barrier(fixture: &Fixture) {
    fixture.context.run(|_| ()).await.unwrap();
}

fn create_user(fixture: &Fixture, id: i64, name: &str) {
    let adapter = fixture.adapter.clone();
    let name = name.to_string();
    fixture.context.submit(move |_| {
        use spyglass_adapter::DatabaseAdapter;
        let mut doc = BTreeMap::new();
        doc.insert("id".to_string(), Value::Int(id));
        doc.insert("name".to_string(), Value::from(name));
        adapter.create("User", &doc).unwrap();
    });
}

// ============================================================================
// Subscribe
// ============================================================================

#[tokio::test]
async fn test_subscribe_registers_and_responds() {
    let mut fixture = fixture();
    fixture
        .manager
        .handle(fixture.client.clone(), subscribe_request("s1", "User"));
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    assert_eq!(messages.len(), 1);
    let response = expect_response(&messages[0]);
    assert!(response.success);
    assert_eq!(response.id, "s1");

    let data = response.data.as_ref().unwrap();
    let subscription_id = data.get("subscriptionId").unwrap().as_str().unwrap();
    assert_eq!(data.get("typeName"), Some(&Value::from("User")));

    assert_eq!(fixture.manager.subscription_count(), 1);
    assert_eq!(fixture.client.subscription_count(), 1);
    assert!(fixture.client.owns_subscription(subscription_id));
}

#[tokio::test]
async fn test_subscribe_unknown_type_fails_cleanly() {
    let mut fixture = fixture();
    fixture
        .manager
        .handle(fixture.client.clone(), subscribe_request("s1", "Ghost"));
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    let response = expect_response(&messages[0]);
    assert!(!response.success);
    assert_eq!(fixture.manager.subscription_count(), 0);
    assert_eq!(fixture.client.subscription_count(), 0);
}

#[tokio::test]
async fn test_subscribe_with_invalid_filter_fails() {
    let mut fixture = fixture();
    let mut params = BTreeMap::new();
    params.insert("typeName".to_string(), Value::from("User"));
    params.insert("filter".to_string(), Value::from("???"));
    fixture.manager.handle(
        fixture.client.clone(),
        Request::with_params("s1", RequestKind::Subscribe, params),
    );
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    let response = expect_response(&messages[0]);
    assert!(!response.success);
    assert!(response.error.as_ref().unwrap().contains("invalid predicate"));
}

// ============================================================================
// Notification flow
// ============================================================================

#[tokio::test]
async fn test_change_notifies_after_subscribe_response() {
    let mut fixture = fixture();
    fixture
        .manager
        .handle(fixture.client.clone(), subscribe_request("s1", "User"));
    create_user(&fixture, 1, "ada");
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    assert_eq!(messages.len(), 2);

    // The subscribe response strictly precedes the first notification
    let response = expect_response(&messages[0]);
    let subscription_id = response
        .data
        .as_ref()
        .unwrap()
        .get("subscriptionId")
        .unwrap()
        .as_str()
        .unwrap()
        .to_string();

    let notification = expect_notification(&messages[1]);
    assert_eq!(notification.subscription_id, subscription_id);
    assert_eq!(notification.type_name, "User");
    assert_eq!(notification.changes.insertions.len(), 1);
    assert!(notification.changes.modifications.is_empty());
    assert!(notification.changes.deletions.is_empty());
}

#[tokio::test]
async fn test_existing_rows_do_not_notify_on_subscribe() {
    let mut fixture = fixture();
    create_user(&fixture, 1, "ada");
    barrier(&fixture).await;

    fixture
        .manager
        .handle(fixture.client.clone(), subscribe_request("s1", "User"));
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    // Only the subscribe response; the initial state is not a change
    assert_eq!(messages.len(), 1);
    expect_response(&messages[0]);
}

#[tokio::test]
async fn test_notifications_stop_after_unsubscribe() {
    let mut fixture = fixture();
    fixture
        .manager
        .handle(fixture.client.clone(), subscribe_request("s1", "User"));
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    let subscription_id = expect_response(&messages[0])
        .data
        .as_ref()
        .unwrap()
        .get("subscriptionId")
        .unwrap()
        .as_str()
        .unwrap()
        .to_string();

    fixture.manager.handle(
        fixture.client.clone(),
        unsubscribe_request("u1", &subscription_id),
    );
    create_user(&fixture, 1, "ada");
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    assert_eq!(messages.len(), 1);
    let response = expect_response(&messages[0]);
    assert!(response.success);
    assert_eq!(fixture.manager.subscription_count(), 0);
    assert_eq!(fixture.client.subscription_count(), 0);
}

#[tokio::test]
async fn test_notifications_dropped_for_closing_client() {
    let mut fixture = fixture();
    fixture
        .manager
        .handle(fixture.client.clone(), subscribe_request("s1", "User"));
    barrier(&fixture).await;
    drain_outbox(&mut fixture);

    fixture.client.close();
    create_user(&fixture, 1, "ada");
    barrier(&fixture).await;

    // The close marker may be queued, but no notification frame is
    let messages = drain_outbox(&mut fixture);
    assert!(messages.is_empty());
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_unsubscribe_unknown_id_is_idempotent() {
    let mut fixture = fixture();
    fixture.manager.handle(
        fixture.client.clone(),
        unsubscribe_request("u1", "no-such-id"),
    );
    barrier(&fixture).await;

    let messages = drain_outbox(&mut fixture);
    let response = expect_response(&messages[0]);
    assert!(response.success);
    assert_eq!(
        response.data.as_ref().unwrap().get("unsubscribed"),
        Some(&Value::Bool(true))
    );
    assert_eq!(fixture.manager.subscription_count(), 0);
}

#[tokio::test]
async fn test_drop_client_tears_down_all_subscriptions() {
    let mut fixture = fixture();
    for i in 0..3 {
        fixture.manager.handle(
            fixture.client.clone(),
            subscribe_request(&format!("s{i}"), "User"),
        );
    }
    barrier(&fixture).await;
    assert_eq!(fixture.manager.subscription_count(), 3);

    fixture.manager.drop_client(&fixture.client);
    barrier(&fixture).await;

    assert_eq!(fixture.manager.subscription_count(), 0);
    assert_eq!(fixture.client.subscription_count(), 0);

    // No further notifications are enqueued for the dropped client
    drain_outbox(&mut fixture);
    create_user(&fixture, 1, "ada");
    barrier(&fixture).await;
    assert!(drain_outbox(&mut fixture).is_empty());
}

#[tokio::test]
async fn test_teardown_all() {
    let mut fixture = fixture();
    for i in 0..2 {
        fixture.manager.handle(
            fixture.client.clone(),
            subscribe_request(&format!("s{i}"), "User"),
        );
    }
    barrier(&fixture).await;
    assert_eq!(fixture.manager.subscription_count(), 2);

    fixture.manager.teardown_all();
    barrier(&fixture).await;

    assert_eq!(fixture.manager.subscription_count(), 0);
    assert_eq!(fixture.client.subscription_count(), 0);
}
