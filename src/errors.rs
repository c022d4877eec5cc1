use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Invalid field type: {operator} requires an array at '{field}'")]
    InvalidFieldType { field: String, operator: &'static str },

    #[error("Malformed update: {0}")]
    MalformedUpdate(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DbError {
    /// True for failures reported by the storage collaborator.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_) | Self::Decode(_) | Self::Encode(_))
    }
}
