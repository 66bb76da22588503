//! File-backed durable stores
//!
//! Layout under the data directory:
//! - `progress/<job-slug>.json`: one durable progress entry per job
//! - `records/<job-slug>.json`: the job key and its records with their final outcomes
//!
//! Both documents carry the job key; reading one that belongs to another job
//! is an error.
//!
//! Every write goes to a temporary file first and is renamed into place, so
//! a crash never leaves a half-written document behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{JobKey, ProgressEntry};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::memory_store::{apply_outcome, merge_records};
use crate::core::{Record, RecordOutcome};
use crate::error::StoreError;
use crate::traits::{DurableStore, RecordStore, WriteResult};

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn check_owner(path: &Path, expected: &JobKey, found: &JobKey) -> Result<(), StoreError> {
    if expected == found {
        return Ok(());
    }
    Err(StoreError::ForeignDocument {
        path: path.display().to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    })
}

async fn ensure_writable(dir: &Path, store: &'static str) -> Result<(), StoreError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::Unavailable {
            store,
            message: format!("{}: {e}", dir.display()),
        })?;
    let metadata = fs::metadata(dir).await?;
    if metadata.permissions().readonly() {
        return Err(StoreError::Unavailable {
            store,
            message: format!("{} is read-only", dir.display()),
        });
    }
    Ok(())
}

/// Durable progress store with one JSON document per job
pub struct FileDurableStore {
    dir: PathBuf,
}

impl FileDurableStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: base_dir.into().join("progress"),
        }
    }

    fn entry_path(&self, key: &JobKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.slug()))
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn put(&self, key: &JobKey, entry: &ProgressEntry) -> Result<(), StoreError> {
        write_atomic(&self.entry_path(key), entry).await
    }

    async fn get(&self, key: &JobKey) -> Result<Option<ProgressEntry>, StoreError> {
        let path = self.entry_path(key);
        let entry: Option<ProgressEntry> = read_json(&path).await?;
        if let Some(entry) = &entry {
            check_owner(&path, key, &entry.key)?;
        }
        Ok(entry)
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let entry: ProgressEntry = match read_json(&path).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    warn!(component = "file_store", path = %path.display(), error = %e, "Skipping unreadable progress entry");
                    continue;
                }
            };
            if entry.updated_at < cutoff {
                fs::remove_file(&path).await?;
                debug!(component = "file_store", job = %entry.key, "Removed expired progress entry");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        ensure_writable(&self.dir, "durable").await
    }
}

/// On-disk layout of one job's records
#[derive(Serialize, Deserialize)]
struct RecordsDocument {
    key: JobKey,
    records: Vec<Record>,
}

/// Record store with one JSON document per job
pub struct FileRecordStore {
    dir: PathBuf,
    /// Serialises read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: base_dir.into().join("records"),
            write_lock: Mutex::new(()),
        }
    }

    fn records_path(&self, key: &JobKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.slug()))
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        ensure_writable(&self.dir, "records").await
    }

    async fn load(&self, key: &JobKey, path: &Path) -> Result<Vec<Record>, StoreError> {
        match read_json::<RecordsDocument>(path).await? {
            Some(document) => {
                check_owner(path, key, &document.key)?;
                Ok(document.records)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, key: &JobKey, path: &Path, records: Vec<Record>) -> Result<(), StoreError> {
        let document = RecordsDocument {
            key: key.clone(),
            records,
        };
        write_atomic(path, &document).await
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn fetch_records(&self, key: &JobKey) -> Result<Vec<Record>, StoreError> {
        self.load(key, &self.records_path(key)).await
    }

    async fn write_outcome(&self, key: &JobKey, outcome: &RecordOutcome) -> Result<WriteResult, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.records_path(key);
        let mut records = self.load(key, &path).await?;
        let result = apply_outcome(key, &mut records, outcome)?;
        if result == WriteResult::Written {
            self.save(key, &path, records).await?;
        }
        Ok(result)
    }

    async fn import_records(&self, key: &JobKey, incoming: Vec<Record>) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.records_path(key);
        let mut records = self.load(key, &path).await?;
        let added = merge_records(&mut records, incoming);
        if added > 0 {
            self.save(key, &path, records).await?;
        }
        Ok(added)
    }
}
