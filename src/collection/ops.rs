use super::core::Collection;
use crate::document;
use crate::errors::DbError;
use crate::query::{
    DeleteReport, InsertManyResult, InsertOneResult, UpdateDoc, UpdateReport, apply_update,
    telemetry,
};
use crate::storage::{Record, WriteOp};
use crate::types::{Document, ID_FIELD};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

fn record_id(doc: &Document) -> Result<String, DbError> {
    document::id_of(doc)
        .map(str::to_string)
        .ok_or_else(|| DbError::InvalidDocument(format!("document without {ID_FIELD}")))
}

fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}

impl Collection {
    fn to_record(&self, id: &str, doc: &Document) -> Result<Record, DbError> {
        Ok(Record::new(id, self.name(), document::encode(doc)?))
    }

    /// Apply `update` to `doc` and keep the record's identifier.
    fn mutate(doc: &Document, update: &UpdateDoc) -> Result<(String, Document), DbError> {
        let id = record_id(doc)?;
        let mut next = apply_update(doc, update)?;
        next.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        Ok((id, next))
    }

    /// Insert one document under a freshly generated identifier.
    ///
    /// # Errors
    /// `InvalidDocument` for non-object input; storage failures are propagated.
    pub async fn insert_one(&self, doc: Value) -> Result<InsertOneResult, DbError> {
        let start = Instant::now();
        let id = document::new_id();
        let doc = document::stamp(doc, &id)?;
        self.storage.insert(self.to_record(&id, &doc)?).await?;
        telemetry::log_audit("insert", self.name(), &id);
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"insert_one\",\"collection\":\"{}\",\"duration_ms\":{}}}",
            self.name(),
            elapsed_ms(start)
        );
        Ok(InsertOneResult { id })
    }

    /// Insert every document in one atomic batch. Identifiers are returned
    /// in input order.
    ///
    /// # Errors
    /// `InvalidDocument` if any input is not an object (nothing is written);
    /// a failing batch leaves no document behind.
    pub async fn insert_many(&self, docs: Vec<Value>) -> Result<InsertManyResult, DbError> {
        if docs.is_empty() {
            return Ok(InsertManyResult::default());
        }
        let start = Instant::now();
        let mut ids = Vec::with_capacity(docs.len());
        let mut ops = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = document::new_id();
            let doc = document::stamp(doc, &id)?;
            ops.push(WriteOp::Insert(self.to_record(&id, &doc)?));
            ids.push(id);
        }
        self.storage.run_atomically(ops).await?;
        for id in &ids {
            telemetry::log_audit("insert", self.name(), id);
        }
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"insert_many\",\"collection\":\"{}\",\"count\":{},\"duration_ms\":{}}}",
            self.name(),
            ids.len(),
            elapsed_ms(start)
        );
        Ok(InsertManyResult { ids })
    }

    /// Update the first document matching `query`.
    ///
    /// The update document is validated before anything is read, so a
    /// malformed update fails even when nothing matches.
    ///
    /// # Errors
    /// `MalformedUpdate`, `InvalidFieldType`, or a storage failure.
    pub async fn update_one(
        self: &Arc<Self>,
        query: &Value,
        update: &Value,
    ) -> Result<UpdateReport, DbError> {
        let update = UpdateDoc::try_from(update)?;
        let start = Instant::now();
        let Some(doc) = self.find_one(query).await? else {
            return Ok(UpdateReport::default());
        };
        let (id, next) = Self::mutate(&doc, &update)?;
        if !self.storage.update(self.to_record(&id, &next)?).await? {
            log::debug!("update of {id} in {} found no record", self.name());
        }
        telemetry::log_audit("update", self.name(), &id);
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"update_one\",\"collection\":\"{}\",\"duration_ms\":{}}}",
            self.name(),
            elapsed_ms(start)
        );
        Ok(UpdateReport { matched_count: 1, modified_count: 1 })
    }

    /// Update every matching document in one atomic batch.
    ///
    /// The full match set is read and every new version computed before
    /// any write is issued.
    ///
    /// # Errors
    /// `MalformedUpdate`, `InvalidFieldType` (nothing written), or a storage
    /// failure (batch rolled back).
    pub async fn update_many(
        self: &Arc<Self>,
        query: &Value,
        update: &Value,
    ) -> Result<UpdateReport, DbError> {
        let update = UpdateDoc::try_from(update)?;
        let start = Instant::now();
        let docs = self.find(query).to_array().await?;
        if docs.is_empty() {
            return Ok(UpdateReport::default());
        }
        let mut ids = Vec::with_capacity(docs.len());
        let mut ops = Vec::with_capacity(docs.len());
        for doc in &docs {
            let (id, next) = Self::mutate(doc, &update)?;
            ops.push(WriteOp::Update(self.to_record(&id, &next)?));
            ids.push(id);
        }
        self.storage.run_atomically(ops).await?;
        for id in &ids {
            telemetry::log_audit("update", self.name(), id);
        }
        let n = crate::utils::num::usize_to_u64(docs.len());
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"update_many\",\"collection\":\"{}\",\"count\":{},\"duration_ms\":{}}}",
            self.name(),
            n,
            elapsed_ms(start)
        );
        Ok(UpdateReport { matched_count: n, modified_count: n })
    }

    /// Delete the first document matching `query`.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn delete_one(self: &Arc<Self>, query: &Value) -> Result<DeleteReport, DbError> {
        let start = Instant::now();
        let Some(doc) = self.find_one(query).await? else {
            return Ok(DeleteReport::default());
        };
        let id = record_id(&doc)?;
        let removed = self.storage.delete(&id, self.name()).await?;
        if removed {
            telemetry::log_audit("delete", self.name(), &id);
        }
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"delete_one\",\"collection\":\"{}\",\"duration_ms\":{}}}",
            self.name(),
            elapsed_ms(start)
        );
        Ok(DeleteReport { deleted_count: u64::from(removed) })
    }

    /// Delete every matching document in one atomic batch.
    ///
    /// # Errors
    /// Propagates storage failures; a failed batch deletes nothing.
    pub async fn delete_many(self: &Arc<Self>, query: &Value) -> Result<DeleteReport, DbError> {
        let start = Instant::now();
        let docs = self.find(query).to_array().await?;
        if docs.is_empty() {
            return Ok(DeleteReport::default());
        }
        let ids = docs.iter().map(record_id).collect::<Result<Vec<_>, _>>()?;
        let ops = ids
            .iter()
            .map(|id| WriteOp::Delete { id: id.clone(), partition: self.name().to_string() })
            .collect();
        let outcomes = self.storage.run_atomically(ops).await?;
        let mut deleted = 0u64;
        for (id, removed) in ids.iter().zip(outcomes) {
            if removed {
                deleted += 1;
                telemetry::log_audit("delete", self.name(), id);
            }
        }
        crate::dev6!(
            "{{\"bench\":\"query\",\"op\":\"delete_many\",\"collection\":\"{}\",\"count\":{},\"duration_ms\":{}}}",
            self.name(),
            deleted,
            elapsed_ms(start)
        );
        Ok(DeleteReport { deleted_count: deleted })
    }
}
