use async_trait::async_trait;
use kvdocs::storage::{Record, StorageStats, WriteOp};
use kvdocs::{DbError, Engine, MemoryStorage, StorageBackend};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

async fn seeded(name: &str, docs: Vec<Value>) -> (Engine, Arc<kvdocs::Collection>) {
    let engine = Engine::in_memory().await.unwrap();
    let col = engine.collection(name);
    col.insert_many(docs).await.unwrap();
    (engine, col)
}

fn values(docs: &[kvdocs::Document], field: &str) -> Vec<Value> {
    docs.iter().map(|d| d.get(field).cloned().unwrap_or(Value::Null)).collect()
}

#[tokio::test]
async fn scenario_a_find_gt() {
    let (_e, col) = seeded(
        "scenario_a",
        vec![json!({"name": "Ann", "value": 10}), json!({"name": "Bob", "value": 20})],
    )
    .await;
    let docs = col.find(&json!({"value": {"$gt": 15}})).to_array().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["name"], "Bob");
    assert_eq!(docs[0]["value"], 20);
    assert!(docs[0]["_id"].is_string());
}

#[tokio::test]
async fn scenario_b_update_one_inc() {
    let (_e, col) = seeded(
        "scenario_b",
        vec![json!({"name": "Ann", "value": 10}), json!({"name": "Bob", "value": 20})],
    )
    .await;
    let report =
        col.update_one(&json!({"name": "Ann"}), &json!({"$inc": {"value": 5}})).await.unwrap();
    assert_eq!((report.matched_count, report.modified_count), (1, 1));
    let ann = col.find_one(&json!({"name": "Ann"})).await.unwrap().unwrap();
    assert_eq!(ann["value"], 15);
    let bob = col.find_one(&json!({"name": "Bob"})).await.unwrap().unwrap();
    assert_eq!(bob["value"], 20);
}

#[tokio::test]
async fn scenario_c_delete_many() {
    let (_e, col) = seeded("scenario_c", vec![json!({"value": 10}), json!({"value": 20})]).await;
    let report = col.delete_many(&json!({"value": {"$lt": 30}})).await.unwrap();
    assert_eq!(report.deleted_count, 2);
    assert_eq!(col.count_documents(&json!({})).await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_d_push_creates_array() {
    let (_e, col) = seeded("scenario_d", vec![json!({"name": "X"})]).await;
    col.update_one(&json!({"name": "X"}), &json!({"$push": {"tags": "t1"}})).await.unwrap();
    let doc = col.find_one(&json!({"name": "X"})).await.unwrap().unwrap();
    assert_eq!(doc["tags"], json!(["t1"]));
    col.update_one(&json!({"name": "X"}), &json!({"$push": {"tags": "t2"}})).await.unwrap();
    let doc = col.find_one(&json!({"name": "X"})).await.unwrap().unwrap();
    assert_eq!(doc["tags"], json!(["t1", "t2"]));
}

#[tokio::test]
async fn scenario_e_sort_ascending() {
    let (_e, col) = seeded(
        "scenario_e",
        vec![json!({"value": 30}), json!({"value": 10}), json!({"value": 20})],
    )
    .await;
    let docs =
        col.find_all().sort_json(&json!({"value": 1})).unwrap().to_array().await.unwrap();
    assert_eq!(values(&docs, "value"), [json!(10), json!(20), json!(30)]);
}

#[tokio::test]
async fn update_and_delete_without_match_report_zero() {
    let (_e, col) = seeded("no_match", vec![json!({"a": 1})]).await;
    let r = col.update_one(&json!({"a": 2}), &json!({"$set": {"b": 1}})).await.unwrap();
    assert_eq!((r.matched_count, r.modified_count), (0, 0));
    let r = col.update_many(&json!({"a": 2}), &json!({"$set": {"b": 1}})).await.unwrap();
    assert_eq!(r.matched_count, 0);
    assert_eq!(col.delete_one(&json!({"a": 2})).await.unwrap().deleted_count, 0);
    assert_eq!(col.delete_many(&json!({"a": 2})).await.unwrap().deleted_count, 0);
}

#[tokio::test]
async fn update_many_touches_every_match() {
    let (_e, col) = seeded(
        "update_many",
        vec![json!({"k": "a", "n": 1}), json!({"k": "a", "n": 2}), json!({"k": "b", "n": 3})],
    )
    .await;
    let r = col
        .update_many(&json!({"k": "a"}), &json!({"$inc": {"n": 10}, "$set": {"seen": true}}))
        .await
        .unwrap();
    assert_eq!((r.matched_count, r.modified_count), (2, 2));
    let mut seen = col.find(&json!({"seen": true})).sort_json(&json!({"n": 1})).unwrap();
    let docs = seen.to_array().await.unwrap();
    assert_eq!(values(&docs, "n"), [json!(11), json!(12)]);
    assert_eq!(col.count_documents(&json!({"seen": {"$exists": false}})).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_one_removes_first_in_scan_order() {
    let (_e, col) = seeded("delete_one", vec![json!({"n": 1}), json!({"n": 2})]).await;
    assert_eq!(col.delete_one(&json!({})).await.unwrap().deleted_count, 1);
    let left = col.find_all().to_array().await.unwrap();
    assert_eq!(values(&left, "n"), [json!(2)]);
}

#[tokio::test]
async fn insert_many_returns_ids_in_order() {
    let engine = Engine::in_memory().await.unwrap();
    let col = engine.collection("ids");
    let ids = col
        .insert_many(vec![json!({"i": 0}), json!({"i": 1}), json!({"i": 2, "_id": "mine"})])
        .await
        .unwrap()
        .ids;
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&"mine".to_string()));
    for (i, id) in ids.iter().enumerate() {
        let doc = col.find_one(&json!({"_id": id})).await.unwrap().unwrap();
        assert_eq!(doc["i"], json!(i));
    }
    assert!(col.insert_many(vec![]).await.unwrap().ids.is_empty());
}

#[tokio::test]
async fn non_object_documents_are_rejected() {
    let engine = Engine::in_memory().await.unwrap();
    let col = engine.collection("invalid");
    assert!(matches!(col.insert_one(json!([1, 2])).await, Err(DbError::InvalidDocument(_))));
    let err = col.insert_many(vec![json!({"ok": 1}), json!("nope")]).await;
    assert!(matches!(err, Err(DbError::InvalidDocument(_))));
    assert_eq!(col.count_documents(&json!({})).await.unwrap(), 0);
}

#[tokio::test]
async fn count_ignores_pagination() {
    let docs = (0..7).map(|i| json!({"i": i})).collect();
    let (_e, col) = seeded("count_pages", docs).await;
    let mut cursor = col.find_all().skip(2).limit(3);
    assert_eq!(cursor.count().await.unwrap(), 7);
    assert_eq!(cursor.to_array().await.unwrap().len(), 3);
}

#[tokio::test]
async fn cursor_fetches_once_and_reapplies_modifiers() {
    let storage = Arc::new(MemoryStorage::new());
    let engine = Engine::new(storage.clone()).await.unwrap();
    let col = engine.collection("memo");
    col.insert_many((0..5).map(|i| json!({"i": i})).collect()).await.unwrap();

    let before = storage.stats().scans;
    let mut cursor = col.find(&json!({"i": {"$gte": 1}}));
    assert!(!cursor.is_executed());
    assert_eq!(cursor.to_array().await.unwrap().len(), 4);
    // inserted after the fetch: not visible to this cursor
    col.insert_one(json!({"i": 9})).await.unwrap();
    let mut cursor = cursor.sort_json(&json!({"i": -1})).unwrap().skip(1).limit(2);
    let page = cursor.to_array().await.unwrap();
    assert_eq!(values(&page, "i"), [json!(3), json!(2)]);
    assert_eq!(cursor.first().await.unwrap().unwrap()["i"], 3);
    assert_eq!(cursor.count().await.unwrap(), 4);
    assert_eq!(storage.stats().scans - before, 1);
}

#[tokio::test]
async fn find_with_options_matches_chaining() {
    let docs = vec![json!({"v": 3}), json!({"v": 1}), json!({"v": 2}), json!({"v": 4})];
    let (_e, col) = seeded("opts", docs).await;
    let opts = kvdocs::query::parse_find_options(&json!({"sort": {"v": -1}, "skip": 1, "limit": 2}))
        .unwrap();
    let a = col.find_with_options(&json!({}), opts).to_array().await.unwrap();
    let b = col
        .find(&json!({}))
        .sort(vec![kvdocs::SortSpec::desc("v")])
        .skip(1)
        .limit(2)
        .to_array()
        .await
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(values(&a, "v"), [json!(3), json!(2)]);
}

#[tokio::test]
async fn malformed_queries_match_nothing() {
    let (_e, col) = seeded("malformed_q", vec![json!({"a": 1})]).await;
    for q in [
        json!({"$and": []}),
        json!({"$or": "x"}),
        json!({"$where": "1"}),
        json!({"a": {"$near": 1}}),
        json!({"a": {"$in": 1}}),
    ] {
        assert_eq!(col.count_documents(&q).await.unwrap(), 0, "{q}");
    }
    assert_eq!(col.count_documents(&json!({"$nor": []})).await.unwrap(), 1);
}

#[tokio::test]
async fn array_operators_end_to_end() {
    let (_e, col) = seeded("arrays", vec![json!({"k": 1, "xs": [1, 2, 3, 2]})]).await;
    col.update_one(
        &json!({"k": 1}),
        &json!({"$pull": {"xs": 2}, "$addToSet": {"xs": 3}, "$pop": {"xs": -1}}),
    )
    .await
    .unwrap();
    let doc = col.find_one(&json!({"k": 1})).await.unwrap().unwrap();
    assert_eq!(doc["xs"], json!([3]));
    let err = col.update_one(&json!({"k": 1}), &json!({"$pop": {"missing": 1}})).await;
    assert!(matches!(err, Err(DbError::InvalidFieldType { .. })));
}

/// Backend that delegates to memory storage but can be told to fail.
struct FailingStorage {
    inner: MemoryStorage,
    fail_scans: AtomicBool,
    fail_batches: AtomicBool,
}

impl FailingStorage {
    fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_scans: AtomicBool::new(false),
            fail_batches: AtomicBool::new(false),
        }
    }
}

fn injected() -> DbError {
    DbError::Storage("injected failure".into())
}

#[async_trait]
impl StorageBackend for FailingStorage {
    async fn ensure_partition_schema(&self) -> Result<(), DbError> {
        self.inner.ensure_partition_schema().await
    }

    async fn scan_partition(&self, partition: &str) -> Result<Vec<Record>, DbError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.scan_partition(partition).await
    }

    async fn insert(&self, record: Record) -> Result<(), DbError> {
        self.inner.insert(record).await
    }

    async fn update(&self, record: Record) -> Result<bool, DbError> {
        self.inner.update(record).await
    }

    async fn delete(&self, id: &str, partition: &str) -> Result<bool, DbError> {
        self.inner.delete(id, partition).await
    }

    async fn run_atomically(&self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.run_atomically(ops).await
    }

    fn stats(&self) -> StorageStats {
        self.inner.stats()
    }
}

#[tokio::test]
async fn storage_failures_propagate_unchanged() {
    let storage = Arc::new(FailingStorage::new());
    let engine = Engine::new(storage.clone()).await.unwrap();
    let col = engine.collection("failing");
    col.insert_one(json!({"a": 1})).await.unwrap();

    storage.fail_batches.store(true, Ordering::SeqCst);
    let err = col.insert_many(vec![json!({"a": 2}), json!({"a": 3})]).await.unwrap_err();
    assert!(err.is_storage());
    let err = col.delete_many(&json!({})).await.unwrap_err();
    assert!(err.is_storage());
    storage.fail_batches.store(false, Ordering::SeqCst);
    assert_eq!(col.count_documents(&json!({})).await.unwrap(), 1);

    storage.fail_scans.store(true, Ordering::SeqCst);
    assert!(col.find_all().to_array().await.unwrap_err().is_storage());
    assert!(col.find_one(&json!({})).await.unwrap_err().is_storage());
    assert!(col.update_one(&json!({}), &json!({"$set": {"b": 1}})).await.unwrap_err().is_storage());
}

#[tokio::test]
async fn operations_before_schema_fail_on_raw_storage() {
    let storage = MemoryStorage::new();
    let err = storage.scan_partition("x").await.unwrap_err();
    assert!(err.is_storage());
}
