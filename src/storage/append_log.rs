use crate::errors::DbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{MemoryStorage, Record, StorageBackend, StorageStats, WriteOp};

/// One durable log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum LogEntry {
    Schema,
    Batch(Vec<WriteOp>),
}

// Frame format: [len u32 le][crc32 u32 le][bincode payload]
const FRAME_HEADER: usize = 8;

fn encode_frame(entry: &LogEntry) -> Result<Vec<u8>, DbError> {
    let payload = bincode::serde::encode_to_vec(entry, bincode::config::standard())?;
    let len = u32::try_from(payload.len())
        .map_err(|_| DbError::Storage(format!("log frame too large: {} bytes", payload.len())))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the longest valid prefix of `bytes`.
///
/// Returns the entries and the byte length of that prefix. Anything after it
/// is a torn or corrupt tail.
fn decode_frames(bytes: &[u8]) -> (Vec<LogEntry>, usize) {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while bytes.len() - pos >= FRAME_HEADER {
        let mut len_buf = [0u8; 4];
        let mut crc_buf = [0u8; 4];
        len_buf.copy_from_slice(&bytes[pos..pos + 4]);
        crc_buf.copy_from_slice(&bytes[pos + 4..pos + FRAME_HEADER]);
        let len = crate::utils::num::u32_to_usize(u32::from_le_bytes(len_buf));
        let start = pos + FRAME_HEADER;
        if bytes.len() - start < len {
            break;
        }
        let payload = &bytes[start..start + len];
        if crc32fast::hash(payload) != u32::from_le_bytes(crc_buf) {
            break;
        }
        match bincode::serde::decode_from_slice::<LogEntry, _>(payload, bincode::config::standard())
        {
            Ok((entry, _)) => entries.push(entry),
            Err(_) => break,
        }
        pos = start + len;
    }
    (entries, pos)
}

struct LogWriter {
    file: tokio::fs::File,
    len: u64,
}

impl LogWriter {
    /// Append and fsync one frame. On failure the file is cut back to its
    /// previous length so a later append does not follow a partial frame.
    async fn append(&mut self, frame: &[u8]) -> Result<(), DbError> {
        if let Err(e) = write_synced(&mut self.file, frame).await {
            if let Err(trunc) = self.file.set_len(self.len).await {
                log::error!("log rollback to {} bytes failed: {trunc}", self.len);
            }
            return Err(e.into());
        }
        self.len += crate::utils::num::usize_to_u64(frame.len());
        Ok(())
    }
}

async fn write_synced(file: &mut tokio::fs::File, frame: &[u8]) -> std::io::Result<()> {
    file.write_all(frame).await?;
    file.flush().await?;
    file.sync_data().await
}

/// File-backed storage: an append-only log of write batches replayed into a
/// [`MemoryStorage`] on open.
///
/// Every batch is one checksummed frame, so a batch is either replayed whole
/// or not at all. A frame reaches disk before the in-memory state changes.
pub struct LogStorage {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    state: MemoryStorage,
}

impl LogStorage {
    /// Open (or create) the log at `path` and replay it.
    ///
    /// A torn or corrupt tail is dropped with a warning and cut from the file.
    ///
    /// # Errors
    /// Returns `Io` when the file cannot be created, read, or truncated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        let bytes = tokio::fs::read(&path).await?;
        let (entries, valid) = decode_frames(&bytes);
        let valid_len = crate::utils::num::usize_to_u64(valid);
        if valid < bytes.len() {
            log::warn!(
                "dropping {} trailing bytes from {}: incomplete or corrupt frame",
                bytes.len() - valid,
                path.display()
            );
            file.set_len(valid_len).await?;
            file.sync_data().await?;
        }

        let state = MemoryStorage::new();
        let mut batches = 0usize;
        for entry in entries {
            match entry {
                LogEntry::Schema => state.create_schema(),
                LogEntry::Batch(ops) => match state.commit_batch(ops) {
                    Ok(_) => batches += 1,
                    Err(e) => log::warn!("skipping unreplayable batch in {}: {e}", path.display()),
                },
            }
        }
        log::info!("opened {} ({batches} batches replayed)", path.display());
        crate::dev6!(
            "{{\"bench\":\"storage\",\"op\":\"replay\",\"path\":\"{}\",\"batches\":{}}}",
            path.display(),
            batches
        );

        Ok(Self { path, writer: Mutex::new(LogWriter { file, len: valid_len }), state })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check `ops`, log them, then apply them in memory.
    ///
    /// The writer lock is held throughout, so no other write can invalidate
    /// the check before the batch is applied.
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError> {
        let mut writer = self.writer.lock().await;
        let outcomes = self.state.check(&ops)?;
        if !outcomes.iter().any(|affected| *affected) {
            return Ok(outcomes);
        }
        writer.append(&encode_frame(&LogEntry::Batch(ops.clone()))?).await?;
        self.state.commit_batch(ops)
    }
}

#[async_trait]
impl StorageBackend for LogStorage {
    async fn ensure_partition_schema(&self) -> Result<(), DbError> {
        let mut writer = self.writer.lock().await;
        if !self.state.is_ready() {
            writer.append(&encode_frame(&LogEntry::Schema)?).await?;
            self.state.create_schema();
        }
        Ok(())
    }

    async fn scan_partition(&self, partition: &str) -> Result<Vec<Record>, DbError> {
        self.state.scan_partition(partition).await
    }

    async fn insert(&self, record: Record) -> Result<(), DbError> {
        self.commit(vec![WriteOp::Insert(record)]).await.map(|_| ())
    }

    async fn update(&self, record: Record) -> Result<bool, DbError> {
        let outcomes = self.commit(vec![WriteOp::Update(record)]).await?;
        Ok(outcomes.first().copied().unwrap_or(false))
    }

    async fn delete(&self, id: &str, partition: &str) -> Result<bool, DbError> {
        let op = WriteOp::Delete { id: id.to_string(), partition: partition.to_string() };
        let outcomes = self.commit(vec![op]).await?;
        Ok(outcomes.first().copied().unwrap_or(false))
    }

    async fn run_atomically(&self, ops: Vec<WriteOp>) -> Result<Vec<bool>, DbError> {
        self.commit(ops).await
    }

    fn stats(&self) -> StorageStats {
        self.state.stats()
    }
}
