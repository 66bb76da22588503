use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{JobKey, JobStatus};
use uuid::Uuid;

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub key: JobKey,
    pub status: JobStatus,
    /// Records known for the job
    pub total: usize,
    /// Records this run selected and started
    pub attempted: usize,
    pub filtered: usize,
    pub processed: usize,
    pub errored: usize,
    pub genes_validated: usize,
    pub timeouts: usize,
    pub critical: usize,
    pub recoveries: usize,
    /// Records already settled by an earlier run
    pub skipped_final: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(key: JobKey) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            key,
            status: JobStatus::Submitted,
            total: 0,
            attempted: 0,
            filtered: 0,
            processed: 0,
            errored: 0,
            genes_validated: 0,
            timeouts: 0,
            critical: 0,
            recoveries: 0,
            skipped_final: 0,
            halt_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn halted(&self) -> bool {
        self.status == JobStatus::Stopped
    }

    pub fn log_summary(&self) {
        shared::job_info!(
            self.key,
            run_id = %self.run_id,
            "📊 Run summary: status={} total={} attempted={} filtered={} processed={} errors={} genes_validated={} timeouts={} critical={} recoveries={} already_final={}",
            self.status,
            self.total,
            self.attempted,
            self.filtered,
            self.processed,
            self.errored,
            self.genes_validated,
            self.timeouts,
            self.critical,
            self.recoveries,
            self.skipped_final
        );
        if let Some(reason) = &self.halt_reason {
            shared::job_error!(self.key, run_id = %self.run_id, "🛑 Run halted: {}", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report_is_submitted() {
        let report = RunReport::new(JobKey::new("IL6", "RA"));
        assert_eq!(report.status, JobStatus::Submitted);
        assert!(report.finished_at.is_none());
        assert!(!report.halted());
    }

    #[test]
    fn test_finish_sets_status_and_time() {
        let mut report = RunReport::new(JobKey::new("IL6", "RA"));
        report.finish(JobStatus::Stopped);
        assert!(report.halted());
        assert!(report.finished_at.is_some());
        report.log_summary();
    }
}
