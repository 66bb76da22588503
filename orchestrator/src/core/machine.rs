//! Per-record state machine
//!
//! ```text
//! Pending -> Stage1Running -> FilteredOut
//!                          -> Stage2Running -> Stage2Error -> Stage2Running (once)
//!                                           -> Stage3Running -> GenesValidated
//!                                                            -> GenesUnvalidated
//!                                           -> NoGenesFound
//! every terminal analysis state -> RecordUpdated
//! ```
//!
//! `Failed` covers the skip paths (timeouts, generic inference failure) and
//! the record a halt happened on; it also converges at `RecordUpdated`.

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    Pending,
    Stage1Running,
    FilteredOut,
    Stage2Running,
    Stage2Error,
    Stage3Running,
    GenesValidated,
    GenesUnvalidated,
    NoGenesFound,
    Failed,
    RecordUpdated,
}

impl RecordState {
    /// States from which only the final-outcome write remains
    pub fn is_terminal_analysis(self) -> bool {
        matches!(
            self,
            RecordState::FilteredOut
                | RecordState::GenesValidated
                | RecordState::GenesUnvalidated
                | RecordState::NoGenesFound
                | RecordState::Failed
        )
    }
}

/// Tracks one record's path and rejects illegal moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMachine {
    state: RecordState,
    stage2_retried: bool,
    history: Vec<RecordState>,
}

impl Default for RecordMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordMachine {
    pub fn new() -> Self {
        Self {
            state: RecordState::Pending,
            stage2_retried: false,
            history: vec![RecordState::Pending],
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn history(&self) -> &[RecordState] {
        &self.history
    }

    pub fn stage2_retried(&self) -> bool {
        self.stage2_retried
    }

    pub fn can_advance(&self, next: RecordState) -> bool {
        use RecordState::*;
        match (self.state, next) {
            (Pending, Stage1Running) => true,
            (Stage1Running, FilteredOut | Stage2Running | Failed) => true,
            (Stage2Running, Stage2Error | Stage3Running | NoGenesFound | Failed) => true,
            (Stage2Error, Stage2Running) => !self.stage2_retried,
            (Stage2Error, Failed) => true,
            (Stage3Running, GenesValidated | GenesUnvalidated | NoGenesFound) => true,
            (from, RecordUpdated) => from.is_terminal_analysis(),
            _ => false,
        }
    }

    pub fn advance(&mut self, next: RecordState) -> OrchestratorResult<()> {
        if !self.can_advance(next) {
            return Err(OrchestratorError::InvalidRecordTransition {
                from: self.state,
                to: next,
            });
        }
        if self.state == RecordState::Stage2Error && next == RecordState::Stage2Running {
            self.stage2_retried = true;
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}
