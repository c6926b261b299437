//! # ledger: status ledger stores
//!
//! Two [`LedgerStore`] implementations:
//! - [`MemoryLedger`]: a lock-protected map, for tests and dry runs.
//! - [`JsonFileLedger`]: a single JSON document on disk. Every `put`,
//!   `put_many` and `delete` rewrites the whole snapshot through a temp file in
//!   the same directory, fsyncs it and renames it into place before returning,
//!   so a recorded `Success` is never lost to a crash. The file I/O runs on
//!   the blocking pool.
//!
//! Both serialise writes on one lock, so concurrent writers for different ids
//! cannot corrupt the store.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::contract::{LedgerStore, SyncRecord, SyncStatus};
use crate::error::LedgerError;

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<BTreeMap<String, SyncRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = SyncRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        MemoryLedger {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get(&self, id: &str) -> Result<Option<SyncRecord>, LedgerError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put(&self, record: SyncRecord) -> Result<(), LedgerError> {
        self.records.lock().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn put_many(&self, batch: Vec<SyncRecord>) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        for record in batch {
            records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncRecord>, LedgerError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<(), LedgerError> {
        self.records.lock().await.remove(id);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    records: Vec<SyncRecord>,
}

#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    records: Mutex<BTreeMap<String, SyncRecord>>,
}

impl JsonFileLedger {
    /// Open the ledger at `path`. A missing file opens as an empty ledger; an
    /// unreadable or malformed one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                let file: LedgerFile =
                    serde_json::from_str(&content).map_err(|source| LedgerError::Malformed {
                        path: path.display().to_string(),
                        source,
                    })?;
                if file.version != LEDGER_VERSION {
                    return Err(LedgerError::Other(format!(
                        "unsupported ledger version {} in {}",
                        file.version,
                        path.display()
                    )));
                }
                file.records
                    .into_iter()
                    .map(|r| (r.id.clone(), r))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger found, starting empty");
                BTreeMap::new()
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        info!(path = %path.display(), records = records.len(), "Opened ledger");
        Ok(JsonFileLedger {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full snapshot atomically. Called with the lock held.
    async fn persist(&self, records: &BTreeMap<String, SyncRecord>) -> Result<(), LedgerError> {
        let snapshot = LedgerFile {
            version: LEDGER_VERSION,
            records: records.values().cloned().collect(),
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot))
            .await
            .map_err(|e| LedgerError::Other(format!("ledger writer task failed: {e}")))?
    }
}

fn write_snapshot(path: &Path, snapshot: &LedgerFile) -> Result<(), LedgerError> {
    let io_err = |source: std::io::Error| LedgerError::Io {
        path: path.display().to_string(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    let mut writer = BufWriter::new(tmp);
    serde_json::to_writer(&mut writer, snapshot)?;
    writer.flush().map_err(io_err)?;
    let tmp = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| {
        error!(error = ?e.error, path = %path.display(), "Failed to move ledger snapshot into place");
        io_err(e.error)
    })?;
    debug!(path = %path.display(), records = snapshot.records.len(), "Ledger persisted");
    Ok(())
}

#[async_trait]
impl LedgerStore for JsonFileLedger {
    async fn get(&self, id: &str) -> Result<Option<SyncRecord>, LedgerError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put(&self, record: SyncRecord) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        let previous = records.insert(record.id.clone(), record.clone());
        if let Err(e) = self.persist(&records).await {
            // Keep memory in step with disk.
            match previous {
                Some(prev) => records.insert(record.id.clone(), prev),
                None => records.remove(&record.id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn put_many(&self, batch: Vec<SyncRecord>) -> Result<(), LedgerError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut records = self.records.lock().await;
        let backup = records.clone();
        for record in batch {
            records.insert(record.id.clone(), record);
        }
        if let Err(e) = self.persist(&records).await {
            *records = backup;
            return Err(e);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncRecord>, LedgerError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<(), LedgerError> {
        let mut records = self.records.lock().await;
        let Some(previous) = records.remove(id) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&records).await {
            records.insert(id.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

/// Per-status counts over a ledger, with the records needing attention.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub by_status: BTreeMap<SyncStatus, usize>,
    pub failed: Vec<SyncRecord>,
}

impl LedgerSummary {
    pub fn from_records(records: Vec<SyncRecord>) -> Self {
        let mut summary = LedgerSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            *summary.by_status.entry(record.status).or_default() += 1;
            if record.status == SyncStatus::Failed {
                summary.failed.push(record);
            }
        }
        summary
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}
