use serde_json::{Map, Value};

pub type CollectionName = String;
pub type DocumentId = String;

/// A document is a JSON object. Key order is preserved.
pub type Document = Map<String, Value>;

/// Name of the identifier field carried inside every persisted document.
pub const ID_FIELD: &str = "_id";
