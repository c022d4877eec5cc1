//! Document payload encoding and identifier generation.
//!
//! A persisted document is stored as its JSON text. Array order and number
//! precision survive the round trip; object key order is preserved as well.

use crate::errors::DbError;
use crate::types::{Document, DocumentId, ID_FIELD};
use serde_json::Value;
use uuid::Uuid;

/// Generate a fresh, collision-resistant document identifier.
#[must_use]
pub fn new_id() -> DocumentId {
    Uuid::new_v4().to_string()
}

/// Serialize a document into its stored text payload.
///
/// # Errors
/// Returns an error if the document cannot be serialized.
pub fn encode(doc: &Document) -> Result<String, DbError> {
    Ok(serde_json::to_string(doc)?)
}

/// Parse a stored payload back into a document.
///
/// # Errors
/// Returns `Json` if the payload is not valid JSON and `InvalidDocument` if
/// it is valid JSON but not an object.
pub fn decode(payload: &str) -> Result<Document, DbError> {
    match serde_json::from_str::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(DbError::InvalidDocument(format!(
            "stored payload is not an object: {}",
            kind_name(&other)
        ))),
    }
}

/// Turn a caller-supplied value into a document stamped with `id`.
///
/// Any `_id` the caller provided is replaced; identifiers are only ever
/// assigned by the store.
///
/// # Errors
/// Returns `InvalidDocument` when `value` is not a JSON object.
pub fn stamp(value: Value, id: &str) -> Result<Document, DbError> {
    let Value::Object(mut map) = value else {
        return Err(DbError::InvalidDocument(format!(
            "expected an object, got {}",
            kind_name(&value)
        )));
    };
    map.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(map)
}

/// The identifier carried inside a decoded document, if any.
#[must_use]
pub fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

pub(crate) fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
