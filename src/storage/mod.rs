//! Storage collaborator used by collections.
//!
//! The document layer needs very little from persistence: a full scan of one
//! partition, keyed insert/update/delete, and an all-or-nothing batch of
//! writes. Everything else (filtering, sorting, mutation) happens in memory.

use crate::errors::DbError;
use crate::types::{CollectionName, DocumentId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod append_log;
mod memory;

pub use self::append_log::LogStorage;
pub use self::memory::MemoryStorage;

/// The persisted unit. `id` is the primary key, `partition` names the
/// owning collection and `payload` is the encoded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: DocumentId,
    pub partition: CollectionName,
    pub payload: String,
}

impl Record {
    pub fn new(
        id: impl Into<DocumentId>,
        partition: impl Into<CollectionName>,
        payload: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), partition: partition.into(), payload: payload.into() }
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    Insert(Record),
    Update(Record),
    Delete { id: DocumentId, partition: CollectionName },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub records: u64,
    pub scans: u64,
    pub writes: u64,
    pub batches: u64,
}

/// Pluggable persistence backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create the record table and the partition lookup index if absent.
    async fn ensure_partition_schema(&self) -> Result<(), DbError>;

    /// Every record whose partition equals `partition`, in no particular order.
    async fn scan_partition(&self, partition: &str) -> Result<Vec<Record>, DbError>;

    /// Insert a new record. Fails if the id is already taken.
    async fn insert(&self, record: Record) -> Result<(), DbError>;

    /// Replace the payload of an existing record. Returns whether one existed.
    async fn update(&self, record: Record) -> Result<bool, DbError>;

    /// Remove a record. Returns whether one existed.
    async fn delete(&self, id: &str, partition: &str) -> Result<bool, DbError>;

    /// Apply every op or none of them. The result holds, per op, whether a
    /// record was affected.
    async fn run_atomically(&self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError>;

    fn stats(&self) -> StorageStats {
        StorageStats::default()
    }
}
