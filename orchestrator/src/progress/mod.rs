//! Progress Tracker
//!
//! Hybrid store: every change is written to the fast, TTL-bounded store
//! first and then mirrored to the durable store. A failed live write aborts
//! the change before the durable store sees it, so the durable copy never
//! shows a state the live store has not recorded. Reads prefer the live
//! entry and fall back to the durable one once the live entry expired.

use chrono::Utc;
use shared::{
    Freshness, JobKey, JobStatus, ProgressEntry, ProgressSnapshot, ProgressSource, SharedError,
    SharedResult, StageLabel, StageStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{DurableStore, FastStore};

pub struct ProgressTracker<F: FastStore, D: DurableStore> {
    fast: Arc<F>,
    durable: Arc<D>,
    live_ttl: Duration,
    retention: Duration,
    /// Working copy of each job's entry; the source of the next write
    working: Mutex<HashMap<JobKey, ProgressEntry>>,
}

impl<F: FastStore, D: DurableStore> ProgressTracker<F, D> {
    pub fn new(fast: Arc<F>, durable: Arc<D>, live_ttl: Duration, retention: Duration) -> Self {
        Self {
            fast,
            durable,
            live_ttl,
            retention,
            working: Mutex::new(HashMap::new()),
        }
    }

    /// Create the job's entry: every stage `pending`, job status `submitted`
    pub async fn init(
        &self,
        key: &JobKey,
        records_total: usize,
        records_done: usize,
    ) -> OrchestratorResult<ProgressEntry> {
        let mut working = self.working.lock().await;
        let mut entry = ProgressEntry::submitted(key.clone(), records_total);
        entry.records_done = records_done;
        self.write_through(&mut entry).await?;
        working.insert(key.clone(), entry.clone());
        shared::job_info!(key, records_total, records_done, "📋 Progress initialised");
        Ok(entry)
    }

    /// Reset the stage board for the next record
    pub async fn begin_record(&self, key: &JobKey, record_id: &str) -> OrchestratorResult<()> {
        self.modify(key, |entry| {
            entry.board.reset();
            entry.current_record = Some(record_id.to_string());
            Ok(true)
        })
        .await
    }

    /// Move one stage of the record in flight. Regressions are rejected.
    pub async fn update(
        &self,
        key: &JobKey,
        stage: StageLabel,
        status: StageStatus,
    ) -> OrchestratorResult<()> {
        self.modify(key, |entry| {
            let changed = entry.board.apply(stage, status)?;
            if changed {
                shared::job_debug!(entry.key, stage = %stage, status = %status, "Stage transition");
            }
            Ok(changed)
        })
        .await
    }

    pub async fn set_job_status(
        &self,
        key: &JobKey,
        status: JobStatus,
        halt_reason: Option<String>,
    ) -> OrchestratorResult<()> {
        self.modify(key, |entry| {
            entry.status = status;
            if halt_reason.is_some() {
                entry.halt_reason = halt_reason;
            }
            if status.is_finished() {
                entry.current_record = None;
            }
            Ok(true)
        })
        .await
    }

    /// Count one more record as done
    pub async fn record_finished(&self, key: &JobKey) -> OrchestratorResult<()> {
        self.modify(key, |entry| {
            entry.records_done = (entry.records_done + 1).min(entry.records_total);
            Ok(true)
        })
        .await
    }

    /// Live entry when present, else the durable one marked stale-but-authoritative
    pub async fn read(&self, key: &JobKey) -> OrchestratorResult<Option<ProgressSnapshot>> {
        if let Some(entry) = self.fast.get(key).await? {
            return Ok(Some(ProgressSnapshot {
                entry,
                freshness: Freshness::Live,
            }));
        }
        Ok(self
            .durable
            .get(key)
            .await?
            .map(|entry| ProgressSnapshot {
                entry,
                freshness: Freshness::StaleButAuthoritative,
            }))
    }

    /// Remove durable entries older than the retention window.
    /// Live entries expire on their own.
    pub async fn cleanup(&self) -> OrchestratorResult<usize> {
        let cutoff = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                OrchestratorError::config("durable_retention", "retention window out of range")
            })?;
        let removed = self.durable.remove_older_than(cutoff).await?;
        if removed > 0 {
            info!(component = "progress", removed, "🧹 Expired durable progress entries removed");
        } else {
            debug!(component = "progress", "No durable progress entries to remove");
        }
        Ok(removed)
    }

    /// Connectivity of both stores
    pub async fn ping(&self) -> OrchestratorResult<()> {
        self.fast.ping().await?;
        self.durable.ping().await?;
        Ok(())
    }

    async fn modify<M>(&self, key: &JobKey, mutate: M) -> OrchestratorResult<()>
    where
        M: FnOnce(&mut ProgressEntry) -> SharedResult<bool>,
    {
        let mut working = self.working.lock().await;
        let mut entry = match working.get(key) {
            Some(entry) => entry.clone(),
            None => self
                .read(key)
                .await?
                .map(|snapshot| snapshot.entry)
                .ok_or_else(|| OrchestratorError::UnknownJob {
                    job: key.to_string(),
                })?,
        };

        if !mutate(&mut entry)? {
            return Ok(());
        }
        self.write_through(&mut entry).await?;
        if entry.status.is_finished() {
            // Stores hold the final entry; nothing more is written for this run
            working.remove(key);
        } else {
            working.insert(key.clone(), entry);
        }
        Ok(())
    }

    async fn write_through(&self, entry: &mut ProgressEntry) -> OrchestratorResult<()> {
        entry.touch();
        self.fast.put(&entry.key, entry, self.live_ttl).await?;
        self.durable.put(&entry.key, entry).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<F: FastStore, D: DurableStore> ProgressSource for ProgressTracker<F, D> {
    async fn progress(&self, key: &JobKey) -> SharedResult<Option<ProgressSnapshot>> {
        self.read(key)
            .await
            .map_err(|e| SharedError::StoreUnavailable {
                message: e.to_string(),
            })
    }
}
