//! Progress bookkeeping types shared by the tracker and the progress endpoint

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{JobKey, JobStatus, StageLabel, StageStatus};
use crate::errors::{SharedError, SharedResult};

/// Per-stage status of the record currently in flight.
///
/// Transitions only move forward: a stage can start once every earlier stage
/// has been processed, and a started stage can only settle into a terminal
/// status. The one exception is a single `deep-analysis` retry after a
/// recovered GPU failure (`error -> processing`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBoard {
    stages: BTreeMap<StageLabel, StageStatus>,
    recovery_retry_used: bool,
}

impl Default for StageBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StageBoard {
    /// Board with every stage `pending`
    pub fn new() -> Self {
        Self {
            stages: StageLabel::ALL
                .iter()
                .map(|label| (*label, StageStatus::Pending))
                .collect(),
            recovery_retry_used: false,
        }
    }

    pub fn status(&self, label: StageLabel) -> StageStatus {
        self.stages
            .get(&label)
            .copied()
            .unwrap_or(StageStatus::Pending)
    }

    pub fn stages(&self) -> &BTreeMap<StageLabel, StageStatus> {
        &self.stages
    }

    pub fn recovery_retry_used(&self) -> bool {
        self.recovery_retry_used
    }

    /// Start over for the next record
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Check whether `label` may move to `next` without mutating the board
    pub fn check(&self, label: StageLabel, next: StageStatus) -> SharedResult<()> {
        let current = self.status(label);
        if current == next {
            return Ok(());
        }

        let allowed = match (current, next) {
            (StageStatus::Pending, StageStatus::Processing) => StageLabel::ALL
                .iter()
                .filter(|earlier| earlier.ordinal() < label.ordinal())
                .all(|earlier| self.status(*earlier) == StageStatus::Processed),
            (StageStatus::Processing, StageStatus::Processed | StageStatus::Error) => true,
            (StageStatus::Processing, StageStatus::FilteredOut) => {
                label == StageLabel::RelevanceFilter
            }
            (StageStatus::Error, StageStatus::Processing) => {
                label == StageLabel::DeepAnalysis && !self.recovery_retry_used
            }
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(SharedError::InvalidTransition {
                stage: label,
                from: current,
                to: next,
            })
        }
    }

    /// Apply a transition. Returns `false` when the status was already set.
    pub fn apply(&mut self, label: StageLabel, next: StageStatus) -> SharedResult<bool> {
        self.check(label, next)?;
        let current = self.status(label);
        if current == next {
            return Ok(false);
        }
        if current == StageStatus::Error && next == StageStatus::Processing {
            self.recovery_retry_used = true;
        }
        self.stages.insert(label, next);
        Ok(true)
    }
}

/// One job's progress record, held live in the fast store and mirrored durably
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub key: JobKey,
    pub status: JobStatus,
    pub board: StageBoard,
    pub current_record: Option<String>,
    pub records_total: usize,
    pub records_done: usize,
    pub halt_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn submitted(key: JobKey, records_total: usize) -> Self {
        let now = Utc::now();
        Self {
            key,
            status: JobStatus::Submitted,
            board: StageBoard::new(),
            current_record: None,
            records_total,
            records_done: 0,
            halt_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Where a snapshot was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Freshness {
    Live,
    StaleButAuthoritative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub entry: ProgressEntry,
    pub freshness: Freshness,
}

/// Body of `GET /dossier/progress/{target}/{disease}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub target: String,
    pub disease: String,
    pub progress: BTreeMap<StageLabel, StageStatus>,
    pub status: JobStatus,
    pub freshness: Freshness,
    pub records_total: usize,
    pub records_done: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        let ProgressSnapshot { entry, freshness } = snapshot;
        Self {
            target: entry.key.target,
            disease: entry.key.disease,
            // The endpoint reports a discarded record's filter stage as processed;
            // the record's own disposition keeps `filtered_out`
            progress: entry
                .board
                .stages
                .into_iter()
                .map(|(label, status)| match status {
                    StageStatus::FilteredOut => (label, StageStatus::Processed),
                    other => (label, other),
                })
                .collect(),
            status: entry.status,
            freshness,
            records_total: entry.records_total,
            records_done: entry.records_done,
            halt_reason: entry.halt_reason,
        }
    }
}

/// Read seam between whoever tracks progress and whoever serves it
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Latest progress for a job, `None` when neither store knows it
    async fn progress(&self, key: &JobKey) -> SharedResult<Option<ProgressSnapshot>>;
}
