//! Runtime value representation consumed by the enforcer and produced by the
//! witness generator.
//!
//! [`Value`] is the dynamic, JSON-like counterpart to the static
//! [`ValueShape`](crate::shape::ValueShape) model. It extends plain JSON with
//! `Bytes` and `Set`, which only appear after the wire codecs (or the coercion
//! collaborator) have interpreted a loosely-typed input against a schema.
//!
//! Numbers are kept opaque as [`serde_json::Number`]; the contract engine
//! never performs arithmetic on them.

use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A runtime value flowing into or out of a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Unique elements (by [`Value::canonical_key`]) in insertion order.
    Set(Vec<Value>),
    /// Object fields in insertion order.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// Creates an integral number value.
    pub fn int(n: i64) -> Value {
        Value::Number(Number::from(n))
    }

    /// Creates an empty object.
    pub fn empty_object() -> Value {
        Value::Object(IndexMap::new())
    }

    /// Returns a human-readable description of the value's dynamic type.
    ///
    /// The names line up with [`ValueShape`](crate::shape::ValueShape)'s
    /// display form so violation reports can compare them directly.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns the elements of an array or set.
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_elements_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Returns `true` if this is a number with no fractional part.
    pub fn is_integral(&self) -> bool {
        match self {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }

    /// Looks up a field on an object value. Non-objects have no fields.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Canonical serialization used as a deduplication key.
    ///
    /// Object keys are sorted and set elements are sorted by their own keys,
    /// so two structurally equal values always produce the same string.
    /// Bytes and sets are tagged so they never collide with arrays.
    pub fn canonical_key(&self) -> String {
        let mut out = String::new();
        write_canonical(self, &mut out);
        out
    }

    /// Converts to a plain JSON value. Bytes become an array of octets and
    /// sets become arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes
                    .iter()
                    .map(|b| serde_json::Value::Number(Number::from(*b)))
                    .collect(),
            ),
            Value::Array(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Text(s) => out.push_str(&serde_json::Value::String(s.clone()).to_string()),
        Value::Bytes(bytes) => {
            out.push_str("b\"");
            for b in bytes {
                let _ = write!(out, "{b:02x}");
            }
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Set(items) => {
            let mut keys: Vec<String> = items.iter().map(Value::canonical_key).collect();
            keys.sort();
            out.push_str("#[");
            out.push_str(&keys.join(","));
            out.push(']');
        }
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = fields.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}
