use crate::document;
use crate::errors::DbError;
use crate::query::{self, Cursor, Filter, FindOptions, telemetry};
use crate::storage::StorageBackend;
use crate::types::{CollectionName, Document};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Named partition of documents backed by a shared storage collaborator.
///
/// Every read is a full scan of the partition followed by in-memory
/// filtering. Writes go straight to storage; there is no cache.
///
/// Known hazard: there is no in-process locking. Two callers doing
/// read-modify-write on the same document (for example two concurrent
/// `update_one` calls with the same query) may both read the same version
/// and the later write wins. Updates computed against stale data are lost.
pub struct Collection {
    name: CollectionName,
    pub(crate) storage: Arc<dyn StorageBackend>,
}

impl Collection {
    pub fn new(name: impl Into<CollectionName>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { name: name.into(), storage }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scan the partition, decode every payload, and keep the documents that
    /// satisfy `filter`, in scan order.
    pub(crate) async fn scan_matching(&self, filter: &Filter) -> Result<Vec<Document>, DbError> {
        let start = Instant::now();
        let records = self.storage.scan_partition(&self.name).await?;
        let scanned = records.len();
        let mut out = Vec::new();
        for record in records {
            let mut doc = document::decode(&record.payload)?;
            doc.insert(crate::types::ID_FIELD.to_string(), Value::String(record.id));
            if query::eval_filter(&doc, filter) {
                out.push(doc);
            }
        }
        telemetry::log_query(&self.name, scanned, out.len(), start.elapsed());
        log::debug!("scan {}: {} of {scanned} matched", self.name, out.len());
        Ok(out)
    }

    /// Unexecuted cursor over documents matching `query`.
    #[must_use]
    pub fn find(self: &Arc<Self>, query: &Value) -> Cursor {
        self.find_with_options(query, FindOptions::default())
    }

    #[must_use]
    pub fn find_all(self: &Arc<Self>) -> Cursor {
        Cursor::new(Arc::clone(self), Filter::all(), FindOptions::default())
    }

    /// Like [`find`](Self::find) with sort/skip/limit pre-seeded.
    #[must_use]
    pub fn find_with_options(self: &Arc<Self>, query: &Value, options: FindOptions) -> Cursor {
        Cursor::new(Arc::clone(self), query::compile(query), options)
    }

    /// First document matching `query`, in scan order.
    ///
    /// # Errors
    /// Propagates storage and decode failures.
    pub async fn find_one(self: &Arc<Self>, query: &Value) -> Result<Option<Document>, DbError> {
        self.find(query).first().await
    }

    /// Number of documents matching `query`.
    ///
    /// # Errors
    /// Propagates storage and decode failures.
    pub async fn count_documents(self: &Arc<Self>, query: &Value) -> Result<usize, DbError> {
        self.find(query).count().await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").field("name", &self.name).finish_non_exhaustive()
    }
}
