//! Request dispatch
//!
//! The dispatcher turns one decoded request into exactly one response. The
//! whole handler - parameter validation, the adapter call, and posting the
//! reply into the client's send queue - runs as a single job on the adapter
//! context, so a client's responses leave in request order and never race
//! the notifications of a subscription created by the same client.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use spyglass_adapter::{AdapterError, DatabaseAdapter, QueryParams};
use spyglass_protocol::{Request, RequestKind, Response, Value};

use crate::client::ClientHandle;
use crate::context::AdapterContext;

/// Default query page size
const DEFAULT_QUERY_LIMIT: i64 = 50;

/// Routes non-subscription requests onto the adapter context
pub struct Dispatcher {
    context: Arc<AdapterContext>,
}

impl Dispatcher {
    pub fn new(context: Arc<AdapterContext>) -> Self {
        Self { context }
    }

    /// Queue the request; the reply is posted from the adapter context
    pub fn dispatch(&self, client: ClientHandle, request: Request) {
        let submitted = self.context.submit(move |adapter| {
            let response = handle_request(adapter, &request);
            client.send_response(response);
        });
        if !submitted {
            // Server shutting down; the client sees a transport close
            warn!("request dropped: adapter context closed");
        }
    }
}

/// Compute the response for one request
pub(crate) fn handle_request(adapter: &dyn DatabaseAdapter, request: &Request) -> Response {
    match run_handler(adapter, request) {
        Ok(data) => Response::ok(&request.id, data),
        Err(e) => Response::fail(&request.id, e.to_string()),
    }
}

/// Handler-level failures, serialized as the response's error string
#[derive(Debug, Error)]
pub(crate) enum HandlerError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },

    #[error("Schema '{0}' not found")]
    SchemaNotFound(String),

    #[error("document of type '{type_name}' with primary key '{key}' not found")]
    DocumentNotFound { type_name: String, key: String },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("internal error: {0}")]
    Internal(String),
}

fn run_handler(
    adapter: &dyn DatabaseAdapter,
    request: &Request,
) -> Result<Value, HandlerError> {
    match request.kind {
        RequestKind::Ping => Ok(Value::from_json(json!({
            "pong": true,
            "timestamp": Utc::now().timestamp_millis(),
        }))),

        RequestKind::GetRealmInfo => to_value(&adapter.info()),

        RequestKind::ListSchemas => {
            let mut entries = Vec::new();
            for schema in adapter.list_schemas() {
                let object_count = adapter.count(&schema.name, None)?;
                entries.push(json!({
                    "name": schema.name,
                    "primaryKey": schema.primary_key,
                    "propertyCount": schema.properties.len(),
                    "isEmbedded": schema.is_embedded,
                    "objectCount": object_count,
                }));
            }
            Ok(Value::from_json(json!(entries)))
        }

        RequestKind::GetSchema => {
            let type_name = require_str(request, "typeName")?;
            let schema = adapter
                .get_schema(type_name)
                .ok_or_else(|| HandlerError::SchemaNotFound(type_name.to_string()))?;
            to_value(&schema)
        }

        RequestKind::QueryDocuments => {
            let params = QueryParams {
                type_name: require_str(request, "typeName")?.to_string(),
                filter: optional_str(request, "filter")?,
                sort_key_path: optional_str(request, "sortKeyPath")?,
                ascending: optional_bool(request, "ascending")?.unwrap_or(true),
                limit: optional_i64(request, "limit")?.unwrap_or(DEFAULT_QUERY_LIMIT),
                skip: optional_i64(request, "skip")?.unwrap_or(0),
            };
            to_value(&adapter.query(&params)?)
        }

        RequestKind::GetDocument => {
            let type_name = require_str(request, "typeName")?;
            let key = primary_key(request)?;
            adapter
                .get(type_name, &key)?
                .ok_or_else(|| HandlerError::DocumentNotFound {
                    type_name: type_name.to_string(),
                    key: display_key(&key),
                })
        }

        RequestKind::CountDocuments => {
            let type_name = require_str(request, "typeName")?;
            let filter = optional_str(request, "filter")?;
            let count = adapter.count(type_name, filter.as_deref())?;
            Ok(Value::from_json(json!({ "count": count })))
        }

        RequestKind::CreateDocument => {
            let type_name = require_str(request, "typeName")?;
            let data = require_object(request, "data")?;
            Ok(adapter.create(type_name, data)?)
        }

        RequestKind::UpdateDocument => {
            let type_name = require_str(request, "typeName")?;
            let key = primary_key(request)?;
            // The inspector UI has shipped both spellings; accept either
            let changes = match request.param("changes") {
                Some(_) => require_object(request, "changes")?,
                None => require_object(request, "data")?,
            };
            Ok(adapter.update(type_name, &key, changes)?)
        }

        RequestKind::DeleteDocument => {
            let type_name = require_str(request, "typeName")?;
            let key = primary_key(request)?;
            let deleted = adapter.delete(type_name, &key)?;
            Ok(Value::from_json(json!({ "deleted": deleted })))
        }

        RequestKind::DeleteAllInCollection => {
            let type_name = require_str(request, "typeName")?;
            let deleted_count = adapter.delete_all_in(type_name)?;
            Ok(Value::from_json(json!({ "deletedCount": deleted_count })))
        }

        RequestKind::DeleteAllInDatabase => to_value(&adapter.delete_all()?),

        // Routed to the subscription manager by the server; reaching the
        // dispatcher is a routing bug, answered rather than panicked on
        RequestKind::Subscribe | RequestKind::Unsubscribe => Err(HandlerError::Internal(
            "subscription requests are handled by the subscription manager".into(),
        )),
    }
}

// ============================================================================
// Parameter helpers
// ============================================================================

pub(crate) fn require<'a>(request: &'a Request, name: &'static str) -> Result<&'a Value, HandlerError> {
    request
        .param(name)
        .ok_or(HandlerError::MissingParameter(name))
}

pub(crate) fn require_str<'a>(
    request: &'a Request,
    name: &'static str,
) -> Result<&'a str, HandlerError> {
    require(request, name)?
        .as_str()
        .ok_or(HandlerError::InvalidParameter {
            name,
            reason: "expected a string".into(),
        })
}

pub(crate) fn optional_str(
    request: &Request,
    name: &'static str,
) -> Result<Option<String>, HandlerError> {
    match request.param(name) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or(HandlerError::InvalidParameter {
                name,
                reason: "expected a string".into(),
            }),
    }
}

fn optional_i64(request: &Request, name: &'static str) -> Result<Option<i64>, HandlerError> {
    match request.param(name) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or(HandlerError::InvalidParameter {
                name,
                reason: "expected an integer".into(),
            }),
    }
}

fn optional_bool(request: &Request, name: &'static str) -> Result<Option<bool>, HandlerError> {
    match request.param(name) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or(HandlerError::InvalidParameter {
                name,
                reason: "expected a boolean".into(),
            }),
    }
}

fn require_object<'a>(
    request: &'a Request,
    name: &'static str,
) -> Result<&'a BTreeMap<String, Value>, HandlerError> {
    require(request, name)?
        .as_map()
        .ok_or(HandlerError::InvalidParameter {
            name,
            reason: "expected an object".into(),
        })
}

/// Extract `primaryKey`, unwrapping typed wire forms to their inner scalar
///
/// `{"_type":"ObjectId","value":"..."}` (and the other typed wrappers)
/// arrive as tagged values from the codec; the adapter gets the bare scalar.
fn primary_key(request: &Request) -> Result<Value, HandlerError> {
    let raw = require(request, "primaryKey")?;
    Ok(unwrap_key(raw))
}

fn unwrap_key(value: &Value) -> Value {
    match value {
        Value::ObjectId(s) | Value::Uuid(s) | Value::Decimal128(s) => Value::String(s.clone()),
        Value::Date(ts) => Value::Int(ts.timestamp_millis()),
        other => other.clone(),
    }
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        other => format!("{other:?}"),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value)
        .map(Value::from_json)
        .map_err(|e| HandlerError::Internal(e.to_string()))
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
