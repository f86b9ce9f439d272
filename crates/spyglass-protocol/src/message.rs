//! Message envelope and payload types
//!
//! The envelope is a tagged union with exactly three variants:
//!
//! - `request` - client asks the agent to do something
//! - `response` - the agent answers exactly one response per request id
//! - `notification` - unsolicited change delivery for a live subscription

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::Value;

/// The wire envelope: `{"type": <tag>, "payload": <variant>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    /// Envelope tag for logging and error reporting
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Notification(_) => "notification",
        }
    }
}

/// The closed set of operations an inspector client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Ping,
    GetRealmInfo,
    ListSchemas,
    GetSchema,
    QueryDocuments,
    GetDocument,
    CountDocuments,
    CreateDocument,
    UpdateDocument,
    DeleteDocument,
    DeleteAllInCollection,
    DeleteAllInDatabase,
    Subscribe,
    Unsubscribe,
}

/// A client request
///
/// `id` is opaque to the agent and echoed verbatim in the matching response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, Value>>,
}

impl Request {
    /// Create a request with no parameters
    pub fn new(id: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            id: id.into(),
            kind,
            params: None,
        }
    }

    /// Create a request with parameters
    pub fn with_params(
        id: impl Into<String>,
        kind: RequestKind,
        params: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            params: Some(params),
        }
    }

    /// Look up a parameter by name
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(name))
    }
}

/// The agent's answer to a request
///
/// Exactly one of `data` / `error` carries meaning, selected by `success`.
/// Both fields are always present on the wire (`null` when unused).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// ISO-8601 with fractional seconds
    pub timestamp: String,
}

impl Response {
    /// A successful response carrying `data`
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
            timestamp: wire_timestamp(),
        }
    }

    /// A failed response carrying a human-readable error
    pub fn fail(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            timestamp: wire_timestamp(),
        }
    }
}

/// Unsolicited change delivery for one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subscription_id: String,
    pub type_name: String,
    pub changes: ChangeSet,
    /// ISO-8601 with fractional seconds
    pub timestamp: String,
}

impl Notification {
    pub fn new(
        subscription_id: impl Into<String>,
        type_name: impl Into<String>,
        changes: ChangeSet,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            type_name: type_name.into(),
            changes,
            timestamp: wire_timestamp(),
        }
    }
}

/// The diff delivered in a notification
///
/// `insertions` and `modifications` hold fully serialized documents at their
/// new state. `deletions` holds stable identifiers of removed rows; when the
/// underlying engine cannot report primary keys for deleted rows, entries
/// fall back to the pre-delete ordinal index rendered as a decimal string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub insertions: Vec<Value>,
    pub modifications: Vec<Value>,
    pub deletions: Vec<String>,
}

impl ChangeSet {
    /// True when no insertions, modifications, or deletions are present
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }
}

/// Current time in the wire timestamp format
pub(crate) fn wire_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
