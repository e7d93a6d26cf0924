//! The request envelope and field helpers used by `validate`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// An incoming request: a mapping of field name to value.
///
/// The harness never looks inside; only the active agent's `validate`
/// and execution paths do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRequest(Map<String, Value>);

/// A request body that is not a JSON object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("request body must be a JSON object, got {0}")]
pub struct NotAnObject(pub &'static str);

impl AgentRequest {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The field as an object, if present and an object.
    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// The field as text, if present and non-empty.
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(text_of)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The request as a JSON value, for run snapshots.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for AgentRequest {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for AgentRequest {
    type Error = NotAnObject;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(NotAnObject("null")),
            Value::Bool(_) => Err(NotAnObject("a boolean")),
            Value::Number(_) => Err(NotAnObject("a number")),
            Value::String(_) => Err(NotAnObject("a string")),
            Value::Array(_) => Err(NotAnObject("an array")),
        }
    }
}

/// Whether a value counts as supplied: not null, not an empty string or
/// collection, not `false` or zero.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a scalar field as text. Strings are returned trimmed; numbers
/// are formatted. Blank strings and other types yield `None`.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text field of a nested object, or `""` when absent.
pub fn text_or_empty(map: &Map<String, Value>, key: &str) -> String {
    map.get(key).and_then(text_of).unwrap_or_default()
}

/// Text field of a nested object, or a placeholder when absent.
pub fn text_or(map: &Map<String, Value>, key: &str, fallback: &str) -> String {
    map.get(key)
        .and_then(text_of)
        .unwrap_or_else(|| fallback.to_string())
}

/// Join an array of scalars with `", "`. Non-arrays yield `""`.
pub fn joined(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

/// Message for a missing required field.
pub fn missing(field: &str) -> String {
    format!("Missing required field: {field}")
}

/// Require `key` to be a present object, returning the rejection message
/// otherwise.
pub fn require_object<'a>(
    request: &'a AgentRequest,
    key: &str,
) -> Result<&'a Map<String, Value>, String> {
    match request.get(key) {
        Some(Value::Object(map)) if !map.is_empty() => Ok(map),
        Some(value) if is_present(value) => Err(format!("Field {key} must be an object")),
        _ => Err(missing(key)),
    }
}

/// Require `parent.key` to be present inside an already-checked object.
pub fn require_nested(map: &Map<String, Value>, parent: &str, key: &str) -> Result<(), String> {
    if map.get(key).is_some_and(is_present) {
        Ok(())
    } else {
        Err(missing(&format!("{parent}.{key}")))
    }
}
