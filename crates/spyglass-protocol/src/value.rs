//! The tagged value model used in every payload
//!
//! [`Value`] covers the scalar and container types an embedded object
//! database exposes, plus the typed wire forms that JSON cannot express
//! natively. Scalars with a natural JSON shape (null, bool, int, double,
//! string, list, object) serialize directly; binary, timestamp, object-id,
//! and decimal values serialize as `{"_type": ..., ...}` wrapper objects and
//! are revived from that shape on decode.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Maximum number of raw bytes carried in a `Data` wire-form preview
pub const DATA_PREVIEW_LIMIT: usize = 128;

/// A JSON-compatible tagged value
///
/// Values are immutable once constructed. Maps use `BTreeMap` so serialized
/// output always has sorted keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Binary blob; serialized as a base64 preview wire form
    Data(Vec<u8>),
    /// Timestamp; serialized as an ISO-8601 + epoch-millis wire form
    Date(DateTime<Utc>),
    /// Opaque object-id string
    ObjectId(String),
    /// Opaque uuid string; serializes as a plain JSON string
    Uuid(String),
    /// Opaque 128-bit decimal string
    Decimal128(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// True for the `Null` variant only
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Typed view as a bool; `None` when the tag does not match
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Typed view as a signed 64-bit integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; succeeds for both integer and double variants
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Typed view as a string slice
    ///
    /// Matches the string-like variants: `String`, `ObjectId`, `Uuid`, and
    /// `Decimal128` are all backed by opaque strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::ObjectId(s) | Value::Uuid(s) | Value::Decimal128(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    /// Typed view as a timestamp
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Typed view as binary data
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Typed view as an ordered sequence
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Typed view as a string-keyed mapping
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in an object value; absent for missing keys and
    /// non-object values alike
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Convert to the JSON wire representation
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Double(d) => json!(d),
            Value::String(s) => json!(s),
            Value::Uuid(s) => json!(s),
            Value::Data(bytes) => {
                let truncated = bytes.len() > DATA_PREVIEW_LIMIT;
                let preview = &bytes[..bytes.len().min(DATA_PREVIEW_LIMIT)];
                json!({
                    "_type": "Data",
                    "length": bytes.len(),
                    "preview": BASE64.encode(preview),
                    "truncated": truncated,
                })
            }
            Value::Date(ts) => json!({
                "_type": "Date",
                "iso": ts.to_rfc3339_opts(SecondsFormat::Millis, true),
                "timestamp": ts.timestamp_millis(),
            }),
            Value::ObjectId(s) => json!({ "_type": "ObjectId", "value": s }),
            Value::Decimal128(s) => json!({ "_type": "Decimal128", "value": s }),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Build a value from its JSON wire representation
    ///
    /// Objects carrying a recognized `_type` discriminator are revived into
    /// their tagged variant. `Reference` and `LinkingObjects` wrappers are
    /// serializer display forms and stay as plain objects.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(revived) = revive_typed(&map) {
                    return revived;
                }
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

/// Revive a `{"_type": ...}` wrapper object into its tagged variant
fn revive_typed(map: &serde_json::Map<String, serde_json::Value>) -> Option<Value> {
    let tag = map.get("_type")?.as_str()?;
    match tag {
        "ObjectId" => Some(Value::ObjectId(map.get("value")?.as_str()?.to_string())),
        "Decimal128" => Some(Value::Decimal128(map.get("value")?.as_str()?.to_string())),
        "Date" => {
            // Prefer the ISO form; fall back to epoch millis
            if let Some(iso) = map.get("iso").and_then(|v| v.as_str()) {
                if let Ok(ts) = DateTime::parse_from_rfc3339(iso) {
                    return Some(Value::Date(ts.with_timezone(&Utc)));
                }
            }
            let millis = map.get("timestamp")?.as_i64()?;
            Utc.timestamp_millis_opt(millis).single().map(Value::Date)
        }
        "Data" => {
            let preview = map.get("preview")?.as_str()?;
            BASE64.decode(preview).ok().map(Value::Data)
        }
        _ => None,
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(json))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}
