//! Core types used throughout the figure analysis system

pub mod progress;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use progress::{
    Freshness, ProgressEntry, ProgressResponse, ProgressSnapshot, ProgressSource, StageBoard,
};

/// Identity of one pipeline run: the (target, disease) scope it covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub target: String,
    pub disease: String,
}

impl JobKey {
    /// Build a key, substituting placeholders for empty scopes
    pub fn new(target: impl Into<String>, disease: impl Into<String>) -> Self {
        let target = target.into();
        let disease = disease.into();
        Self {
            target: if target.trim().is_empty() {
                "no-target".to_string()
            } else {
                target.trim().to_string()
            },
            disease: if disease.trim().is_empty() {
                "no-disease".to_string()
            } else {
                disease.trim().to_string()
            },
        }
    }

    /// Filesystem safe representation of the key.
    ///
    /// Distinct keys always give distinct slugs, also on case-insensitive
    /// filesystems: `[a-z0-9-]` is kept as is, every other UTF-8 byte becomes
    /// `_xx` in lowercase hex, and the two parts are joined with `__`.
    pub fn slug(&self) -> String {
        format!("{}__{}", escape(&self.target), escape(&self.disease))
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => out.push(char::from(byte)),
            _ => out.push_str(&format!("_{byte:02x}")),
        }
    }
    out
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.disease)
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageLabel {
    RelevanceFilter,
    DeepAnalysis,
    GeneValidation,
}

impl StageLabel {
    pub const ALL: [StageLabel; 3] = [
        StageLabel::RelevanceFilter,
        StageLabel::DeepAnalysis,
        StageLabel::GeneValidation,
    ];

    /// 1-based position in the pipeline
    pub fn ordinal(self) -> u8 {
        match self {
            StageLabel::RelevanceFilter => 1,
            StageLabel::DeepAnalysis => 2,
            StageLabel::GeneValidation => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageLabel::RelevanceFilter => "relevance-filter",
            StageLabel::DeepAnalysis => "deep-analysis",
            StageLabel::GeneValidation => "gene-validation",
        }
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one stage for the record in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Processing,
    Processed,
    Error,
    FilteredOut,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Processed | StageStatus::Error | StageStatus::FilteredOut
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Processed => "processed",
            StageStatus::Error => "error",
            StageStatus::FilteredOut => "filtered_out",
        };
        f.write_str(s)
    }
}

/// Job-level run status as reported to progress readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Processed,
    Stopped,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Stopped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Submitted => "submitted",
            JobStatus::InProgress => "in-progress",
            JobStatus::Processed => "processed",
            JobStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
