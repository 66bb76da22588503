//! In-process store implementations
//!
//! `InMemoryFastStore` is the live progress store the binary runs with: a map
//! with per-entry expiry on the tokio clock. The durable and record variants
//! back tests and dry runs.

use chrono::{DateTime, Utc};
use shared::{JobKey, ProgressEntry};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::core::{Record, RecordOutcome};
use crate::error::StoreError;
use crate::traits::{DurableStore, FastStore, RecordStore, WriteResult};

/// TTL-bounded live progress store
#[derive(Default)]
pub struct InMemoryFastStore {
    entries: RwLock<HashMap<JobKey, (ProgressEntry, Instant)>>,
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FastStore for InMemoryFastStore {
    async fn put(&self, key: &JobKey, entry: &ProgressEntry, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.clone(), (entry.clone(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &JobKey) -> Result<Option<ProgressEntry>, StoreError> {
        let mut entries = self.entries.write().await;
        let expired = match entries.get(key) {
            Some((_, expires_at)) => *expires_at <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(entry, _)| entry.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDurableStore {
    entries: RwLock<HashMap<JobKey, ProgressEntry>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn put(&self, key: &JobKey, entry: &ProgressEntry) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, key: &JobKey) -> Result<Option<ProgressEntry>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.updated_at >= cutoff);
        Ok(before - entries.len())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    jobs: RwLock<HashMap<JobKey, Vec<Record>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(key: JobKey, records: Vec<Record>) -> Self {
        let mut jobs = HashMap::new();
        jobs.insert(key, records);
        Self {
            jobs: RwLock::new(jobs),
        }
    }
}

/// Apply `outcome` to the matching record unless it is already settled
pub(crate) fn apply_outcome(
    key: &JobKey,
    records: &mut [Record],
    outcome: &RecordOutcome,
) -> Result<WriteResult, StoreError> {
    let record = records
        .iter_mut()
        .find(|record| record.id == outcome.record_id)
        .ok_or_else(|| StoreError::RecordNotFound {
            job: key.to_string(),
            record_id: outcome.record_id.to_string(),
        })?;

    if record.disposition.is_settled() {
        return Ok(WriteResult::Unchanged);
    }
    record.disposition = outcome.disposition;
    record.outcome = Some(outcome.clone());
    Ok(WriteResult::Written)
}

/// Append records with unseen ids, returning how many were added
pub(crate) fn merge_records(existing: &mut Vec<Record>, incoming: Vec<Record>) -> usize {
    let mut added = 0;
    for record in incoming {
        if existing.iter().all(|known| known.id != record.id) {
            existing.push(record);
            added += 1;
        }
    }
    added
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_records(&self, key: &JobKey) -> Result<Vec<Record>, StoreError> {
        Ok(self.jobs.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn write_outcome(&self, key: &JobKey, outcome: &RecordOutcome) -> Result<WriteResult, StoreError> {
        let mut jobs = self.jobs.write().await;
        let records = jobs.get_mut(key).ok_or_else(|| StoreError::RecordNotFound {
            job: key.to_string(),
            record_id: outcome.record_id.to_string(),
        })?;
        apply_outcome(key, records, outcome)
    }

    async fn import_records(&self, key: &JobKey, records: Vec<Record>) -> Result<usize, StoreError> {
        let mut jobs = self.jobs.write().await;
        Ok(merge_records(jobs.entry(key.clone()).or_default(), records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Disposition, RecordId};

    fn outcome(id: &str, disposition: Disposition) -> RecordOutcome {
        RecordOutcome {
            record_id: RecordId::new(id),
            disposition,
            stages: Vec::new(),
            genes: vec!["BRCA1".to_string()],
            genes_validated: true,
            findings: None,
            error: None,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_store_expires_entries() {
        let store = InMemoryFastStore::new();
        let key = JobKey::new("IL6", "RA");
        let entry = ProgressEntry::submitted(key.clone(), 1);
        store.put(&key, &entry, Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get(&key).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_outcome_is_idempotent_once_settled() {
        let key = JobKey::new("IL6", "RA");
        let store = InMemoryRecordStore::with_records(key.clone(), vec![Record::new("r1", "img")]);

        assert_eq!(
            store
                .write_outcome(&key, &outcome("r1", Disposition::Processed))
                .await
                .unwrap(),
            WriteResult::Written
        );
        assert_eq!(
            store
                .write_outcome(&key, &outcome("r1", Disposition::Error))
                .await
                .unwrap(),
            WriteResult::Unchanged
        );

        let records = store.fetch_records(&key).await.unwrap();
        assert_eq!(records[0].disposition, Disposition::Processed);
    }

    #[tokio::test]
    async fn test_error_disposition_can_be_overwritten() {
        let key = JobKey::new("IL6", "RA");
        let store = InMemoryRecordStore::with_records(key.clone(), vec![Record::new("r1", "img")]);
        store
            .write_outcome(&key, &outcome("r1", Disposition::Error))
            .await
            .unwrap();
        assert_eq!(
            store
                .write_outcome(&key, &outcome("r1", Disposition::Processed))
                .await
                .unwrap(),
            WriteResult::Written
        );
    }

    #[tokio::test]
    async fn test_import_skips_known_ids() {
        let key = JobKey::new("IL6", "RA");
        let store = InMemoryRecordStore::new();
        let added = store
            .import_records(&key, vec![Record::new("r1", "a"), Record::new("r2", "b")])
            .await
            .unwrap();
        assert_eq!(added, 2);
        let added = store
            .import_records(&key, vec![Record::new("r2", "b"), Record::new("r3", "c")])
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(store.fetch_records(&key).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_record_is_reported() {
        let key = JobKey::new("IL6", "RA");
        let store = InMemoryRecordStore::with_records(key.clone(), vec![]);
        let err = store
            .write_outcome(&key, &outcome("ghost", Disposition::Processed))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }
}
