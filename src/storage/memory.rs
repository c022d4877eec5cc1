use crate::errors::DbError;
use crate::types::{CollectionName, DocumentId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Record, StorageBackend, StorageStats, WriteOp};

/// Record table plus a lookup index on the partition discriminator.
///
/// Each record carries an insertion sequence number so partition scans are
/// returned in insertion order.
#[derive(Debug, Default)]
pub(crate) struct Table {
    records: HashMap<DocumentId, (u64, Record)>,
    by_partition: HashMap<CollectionName, BTreeMap<u64, DocumentId>>,
    next_seq: u64,
}

impl Table {
    fn scan(&self, partition: &str) -> Vec<Record> {
        self.by_partition
            .get(partition)
            .map(|ids| {
                ids.values()
                    .filter_map(|id| self.records.get(id).map(|(_, r)| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Apply one op. An op that fails leaves the table unchanged.
    pub(crate) fn apply(&mut self, op: WriteOp) -> Result<bool, DbError> {
        match op {
            WriteOp::Insert(record) => {
                if self.records.contains_key(&record.id) {
                    return Err(duplicate(&record.id));
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                self.by_partition
                    .entry(record.partition.clone())
                    .or_default()
                    .insert(seq, record.id.clone());
                self.records.insert(record.id.clone(), (seq, record));
                Ok(true)
            }
            WriteOp::Update(record) => match self.records.get_mut(&record.id) {
                Some((_, existing)) if existing.partition == record.partition => {
                    existing.payload = record.payload;
                    Ok(true)
                }
                _ => Ok(false),
            },
            WriteOp::Delete { id, partition } => {
                let Some((seq, existing)) = self.records.get(&id) else {
                    return Ok(false);
                };
                if existing.partition != partition {
                    return Ok(false);
                }
                let seq = *seq;
                self.records.remove(&id);
                if let Some(ids) = self.by_partition.get_mut(&partition) {
                    ids.remove(&seq);
                    if ids.is_empty() {
                        self.by_partition.remove(&partition);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Outcomes `ops` would have, in order, without touching the table.
    ///
    /// Later ops see the effect of earlier ones through an overlay of the ids
    /// the batch has touched, so the cost is linear in the batch length.
    pub(crate) fn check(&self, ops: &[WriteOp]) -> Result<Vec<bool>, DbError> {
        // id -> partition it lives in after the ops seen so far (None: deleted)
        let mut overlay: HashMap<&str, Option<&str>> = HashMap::new();
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            let (id, partition) = match op {
                WriteOp::Insert(r) | WriteOp::Update(r) => (r.id.as_str(), r.partition.as_str()),
                WriteOp::Delete { id, partition } => (id.as_str(), partition.as_str()),
            };
            let current = match overlay.get(id) {
                Some(p) => *p,
                None => self.records.get(id).map(|(_, r)| r.partition.as_str()),
            };
            let affected = match op {
                WriteOp::Insert(_) => {
                    if current.is_some() {
                        return Err(duplicate(id));
                    }
                    overlay.insert(id, Some(partition));
                    true
                }
                WriteOp::Update(_) => current == Some(partition),
                WriteOp::Delete { .. } => {
                    let hit = current == Some(partition);
                    if hit {
                        overlay.insert(id, None);
                    }
                    hit
                }
            };
            outcomes.push(affected);
        }
        Ok(outcomes)
    }

    /// Apply every op in `ops` or none of them.
    pub(crate) fn apply_batch(&mut self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError> {
        let outcomes = self.check(&ops)?;
        for op in ops {
            self.apply(op)?;
        }
        Ok(outcomes)
    }
}

fn duplicate(id: &str) -> DbError {
    DbError::Storage(format!("duplicate record id {id}"))
}

#[derive(Default)]
struct Counters {
    scans: AtomicU64,
    writes: AtomicU64,
    batches: AtomicU64,
}

/// In-process storage backend.
///
/// Operations issued before `ensure_partition_schema` fail, the same way a
/// SQL backend fails before its table exists. Atomic batches are checked
/// against the live table first and applied only when every op would succeed.
#[derive(Default)]
pub struct MemoryStorage {
    table: RwLock<Option<Table>>,
    counters: Counters,
}

fn not_ready() -> DbError {
    DbError::Storage("record table does not exist; ensure_partition_schema was not run".into())
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.table.read().is_some()
    }

    pub(crate) fn create_schema(&self) {
        let mut t = self.table.write();
        if t.is_none() {
            *t = Some(Table::default());
        }
    }

    /// Outcomes a batch would have against the current table.
    pub(crate) fn check(&self, ops: &[WriteOp]) -> Result<Vec<bool>, DbError> {
        self.table.read().as_ref().ok_or_else(not_ready)?.check(ops)
    }

    /// Apply a batch as one unit under the table lock.
    pub(crate) fn commit_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError> {
        let n = ops.len();
        let outcomes = {
            let mut guard = self.table.write();
            guard.as_mut().ok_or_else(not_ready)?.apply_batch(ops)?
        };
        self.counters.writes.fetch_add(crate::utils::num::usize_to_u64(n), Ordering::Relaxed);
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        Ok(outcomes)
    }

    fn apply_one(&self, op: WriteOp) -> Result<bool, DbError> {
        let mut guard = self.table.write();
        let table = guard.as_mut().ok_or_else(not_ready)?;
        let affected = table.apply(op)?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(affected)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn ensure_partition_schema(&self) -> Result<(), DbError> {
        self.create_schema();
        Ok(())
    }

    async fn scan_partition(&self, partition: &str) -> Result<Vec<Record>, DbError> {
        let guard = self.table.read();
        let table = guard.as_ref().ok_or_else(not_ready)?;
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        Ok(table.scan(partition))
    }

    async fn insert(&self, record: Record) -> Result<(), DbError> {
        self.apply_one(WriteOp::Insert(record)).map(|_| ())
    }

    async fn update(&self, record: Record) -> Result<bool, DbError> {
        self.apply_one(WriteOp::Update(record))
    }

    async fn delete(&self, id: &str, partition: &str) -> Result<bool, DbError> {
        self.apply_one(WriteOp::Delete { id: id.to_string(), partition: partition.to_string() })
    }

    async fn run_atomically(&self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError> {
        self.commit_batch(ops)
    }

    fn stats(&self) -> StorageStats {
        let records = self
            .table
            .read()
            .as_ref()
            .map_or(0, |t| crate::utils::num::usize_to_u64(t.records.len()));
        StorageStats {
            records,
            scans: self.counters.scans.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, part: &str, payload: &str) -> Record {
        Record::new(id, part, payload)
    }

    #[tokio::test]
    async fn operations_require_schema() {
        let s = MemoryStorage::new();
        assert!(matches!(s.scan_partition("c").await, Err(DbError::Storage(_))));
        assert!(s.insert(rec("1", "c", "{}")).await.is_err());
        s.ensure_partition_schema().await.unwrap();
        s.ensure_partition_schema().await.unwrap();
        s.insert(rec("1", "c", "{}")).await.unwrap();
        assert_eq!(s.scan_partition("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_is_per_partition_and_ordered() {
        let s = MemoryStorage::new();
        s.ensure_partition_schema().await.unwrap();
        for (id, part) in [("b", "x"), ("a", "x"), ("z", "y"), ("c", "x")] {
            s.insert(rec(id, part, "{}")).await.unwrap();
        }
        let ids: Vec<String> = s.scan_partition("x").await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["b", "a", "c"]);
        assert!(s.scan_partition("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_respect_partition() {
        let s = MemoryStorage::new();
        s.ensure_partition_schema().await.unwrap();
        s.insert(rec("1", "x", "old")).await.unwrap();
        assert!(!s.update(rec("1", "y", "new")).await.unwrap());
        assert!(s.update(rec("1", "x", "new")).await.unwrap());
        assert_eq!(s.scan_partition("x").await.unwrap()[0].payload, "new");
        assert!(!s.delete("1", "y").await.unwrap());
        assert!(s.delete("1", "x").await.unwrap());
        assert!(!s.delete("1", "x").await.unwrap());
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let s = MemoryStorage::new();
        s.ensure_partition_schema().await.unwrap();
        s.insert(rec("dup", "x", "{}")).await.unwrap();
        let res = s
            .run_atomically(vec![
                WriteOp::Insert(rec("fresh", "x", "{}")),
                WriteOp::Delete { id: "dup".into(), partition: "x".into() },
                WriteOp::Insert(rec("dup", "x", "{}")),
                WriteOp::Insert(rec("dup", "x", "{}")),
            ])
            .await;
        assert!(matches!(res, Err(DbError::Storage(_))));
        let ids: Vec<String> = s.scan_partition("x").await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["dup"]);
    }

    #[tokio::test]
    async fn batch_reports_per_op_outcome() {
        let s = MemoryStorage::new();
        s.ensure_partition_schema().await.unwrap();
        s.insert(rec("1", "x", "{}")).await.unwrap();
        let out = s
            .run_atomically(vec![
                WriteOp::Delete { id: "1".into(), partition: "x".into() },
                WriteOp::Delete { id: "missing".into(), partition: "x".into() },
            ])
            .await
            .unwrap();
        assert_eq!(out, [true, false]);
        assert_eq!(s.stats().batches, 1);
        assert_eq!(s.stats().records, 0);
    }

    #[tokio::test]
    async fn batch_ops_see_earlier_ops_in_the_same_batch() {
        let s = MemoryStorage::new();
        s.ensure_partition_schema().await.unwrap();
        s.insert(rec("1", "x", "old")).await.unwrap();
        let out = s
            .run_atomically(vec![
                WriteOp::Delete { id: "1".into(), partition: "x".into() },
                WriteOp::Update(rec("1", "x", "gone")),
                WriteOp::Insert(rec("1", "x", "again")),
                WriteOp::Update(rec("1", "x", "new")),
                WriteOp::Insert(rec("2", "y", "{}")),
                WriteOp::Delete { id: "2".into(), partition: "x".into() },
            ])
            .await
            .unwrap();
        assert_eq!(out, [true, false, true, true, true, false]);
        assert_eq!(s.scan_partition("x").await.unwrap(), vec![rec("1", "x", "new")]);
        assert_eq!(s.scan_partition("y").await.unwrap().len(), 1);

        let res = s
            .run_atomically(vec![WriteOp::Insert(rec("3", "x", "{}")), WriteOp::Insert(rec("3", "y", "{}"))])
            .await;
        assert!(matches!(res, Err(DbError::Storage(_))));
        assert_eq!(s.stats().records, 2);
    }

    #[tokio::test]
    async fn failed_batch_keeps_scan_order() {
        let s = MemoryStorage::new();
        s.ensure_partition_schema().await.unwrap();
        for i in 0..500 {
            s.run_atomically(vec![WriteOp::Insert(rec(&i.to_string(), "x", "{}"))]).await.unwrap();
        }
        let res = s
            .run_atomically(vec![
                WriteOp::Delete { id: "0".into(), partition: "x".into() },
                WriteOp::Insert(rec("fresh", "x", "{}")),
                WriteOp::Insert(rec("499", "x", "{}")),
            ])
            .await;
        assert!(res.is_err());
        s.insert(rec("last", "x", "{}")).await.unwrap();
        let ids: Vec<String> = s.scan_partition("x").await.unwrap().into_iter().map(|r| r.id).collect();
        let mut expected: Vec<String> = (0..500).map(|i: i32| i.to_string()).collect();
        expected.push("last".into());
        assert_eq!(ids, expected);
        assert_eq!(s.stats().batches, 500);
    }
}
