//! Embedded document store with MongoDB-style queries and updates over a
//! single-table key/value backend.
//!
//! ```no_run
//! # async fn demo() -> Result<(), kvdocs::DbError> {
//! use serde_json::json;
//!
//! let engine = kvdocs::Engine::in_memory().await?;
//! let users = engine.collection("users");
//! users.insert_one(json!({"name": "Ann", "value": 10})).await?;
//! let found = users.find(&json!({"value": {"$gt": 5}})).sort_json(&json!({"value": -1}))?.to_array().await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod query;
pub mod storage;
pub mod types;
pub mod utils;

pub use crate::collection::Collection;
pub use crate::config::StoreConfig;
pub use crate::engine::Engine;
pub use crate::errors::DbError;
pub use crate::query::{Cursor, FindOptions, SortSpec};
pub use crate::storage::{LogStorage, MemoryStorage, StorageBackend};
pub use crate::types::Document;
