use crate::collection::Collection;
use crate::config::{BackendKind, StoreConfig};
use crate::errors::DbError;
use crate::query::telemetry;
use crate::storage::{LogStorage, MemoryStorage, StorageBackend};
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Top-level entry point: owns the storage backend and hands out one
/// [`Collection`] handle per name.
///
/// Collections are created on first reference and live as long as the
/// engine; nothing about them is persisted beyond the records themselves.
pub struct Engine {
    storage: Arc<dyn StorageBackend>,
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("collections", &self.collection_names()).finish()
    }
}

impl Engine {
    /// Wrap `storage`, creating its record table and partition index.
    ///
    /// Bootstrap is awaited here, so no operation can run before it.
    ///
    /// # Errors
    /// Propagates the backend's schema failure.
    pub async fn new(storage: Arc<dyn StorageBackend>) -> Result<Self, DbError> {
        storage.ensure_partition_schema().await?;
        Ok(Self { storage, collections: RwLock::new(HashMap::new()) })
    }

    /// Engine over a fresh [`MemoryStorage`].
    ///
    /// # Errors
    /// Never fails in practice; the signature matches [`Engine::new`].
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(Arc::new(MemoryStorage::new())).await
    }

    /// Build the backend named by `config`, apply its logging and telemetry
    /// settings, and bootstrap it.
    ///
    /// # Errors
    /// `Config` for an invalid configuration or logger setup, `Io` when the
    /// log file cannot be opened.
    pub async fn open(config: &StoreConfig) -> Result<Self, DbError> {
        config.validate()?;
        if config.logging.enabled {
            crate::utils::logger::configure_section(&config.logging)?;
        }
        telemetry::configure(telemetry::TelemetryConfig {
            slow_query_ms: config.telemetry.slow_query_ms,
            enable_audit: config.telemetry.audit,
        });
        let storage: Arc<dyn StorageBackend> = match (config.storage.backend, &config.storage.path)
        {
            (BackendKind::Memory, _) => Arc::new(MemoryStorage::new()),
            (BackendKind::Log, Some(path)) => Arc::new(LogStorage::open(path).await?),
            (BackendKind::Log, None) => {
                return Err(DbError::Config("log backend requires a path".into()));
            }
        };
        log::info!("engine opened with {:?} backend", config.storage.backend);
        Self::new(storage).await
    }

    /// The handle for `name`, created on first use. Repeated calls return
    /// the same `Arc`.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(c) = self.collections.read().get(name) {
            return Arc::clone(c);
        }
        let mut map = self.collections.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| {
            log::debug!("collection handle created: {name}");
            Arc::new(Collection::new(name, Arc::clone(&self.storage)))
        }))
    }

    /// Names of the collections referenced so far, sorted.
    #[must_use]
    pub fn collection_names(&self) -> Vec<CollectionName> {
        let mut names: Vec<_> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        telemetry::flush_metrics();
    }
}
