//! Orchestrator-specific error types

use shared::SharedError;
use thiserror::Error;

use crate::core::RecordState;

/// Failures of the model lifecycle itself (not of a single inference)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("GPU memory exhausted: {detail}")]
    ResourceExhausted { detail: String },

    #[error("Model handle generation {held} is stale (current: {current:?})")]
    StaleHandle { held: u64, current: Option<u64> },

    #[error("Model is not loaded")]
    NotLoaded,

    #[error("Model recovery failed after {attempts} attempt(s): {reason}")]
    RecoveryFailed { attempts: u32, reason: String },

    #[error("Model backend error: {reason}")]
    Backend { reason: String },
}

/// Failures of the fast, durable or record stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{store} store unavailable: {message}")]
    Unavailable { store: &'static str, message: String },

    #[error("Record {record_id} not found for job {job}")]
    RecordNotFound { job: String, record_id: String },

    /// A stored document belongs to a different job than the one requested
    #[error("{path} holds job {found}, expected {expected}")]
    ForeignDocument {
        path: String,
        expected: String,
        found: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Pipeline prerequisites not met: {reason}")]
    NotReady { reason: String },

    #[error("Configuration error: {field} ({reason})")]
    ConfigurationError { field: String, reason: String },

    #[error("No progress entry for job {job}")]
    UnknownJob { job: String },

    #[error("Record state machine violation: {from:?} -> {to:?}")]
    InvalidRecordTransition { from: RecordState, to: RecordState },

    #[error("Model lifecycle error: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Progress error: {0}")]
    Shared(#[from] SharedError),
}

impl OrchestratorError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
