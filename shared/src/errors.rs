//! Shared error types for the figure analysis system

use thiserror::Error;

use crate::types::{StageLabel, StageStatus};

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid stage transition for {stage}: {from} -> {to}")]
    InvalidTransition {
        stage: StageLabel,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Progress store unavailable: {message}")]
    StoreUnavailable { message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
