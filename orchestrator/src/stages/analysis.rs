use std::sync::Arc;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tracing::{debug, warn};

use crate::core::{Findings, Record};
use crate::error::ModelError;
use crate::model::{ModelHandle, ModelLifecycleManager};
use crate::traits::{InferenceError, VisionBackend};

/// Gate outcome wrapping the T2 timeout wrapping the inference result
type GateResult = Result<Result<Result<Findings, InferenceError>, Elapsed>, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Findings(Findings),
    Timeout,
    ResourceExhausted { detail: String },
    /// Any other inference failure: bad output, server error
    Failed { reason: String },
}

/// Stage 2: deep analysis under the model's exclusive gate, bounded by T2.
///
/// T2 covers the inference call only; waiting for the gate is unbounded.
pub struct DeepAnalyzer<B: VisionBackend> {
    model: Arc<ModelLifecycleManager<B>>,
    timeout: Duration,
}

impl<B: VisionBackend> DeepAnalyzer<B> {
    pub fn new(model: Arc<ModelLifecycleManager<B>>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn model(&self) -> &Arc<ModelLifecycleManager<B>> {
        &self.model
    }

    /// Analyse `record`. A handle invalidated by another job's recovery is
    /// refreshed through the idempotent `load` once; `handle` is updated.
    pub async fn analyze(&self, record: &Record, handle: &mut ModelHandle) -> AnalysisOutcome {
        match self.run(record, handle).await {
            Err(ModelError::StaleHandle { .. }) | Err(ModelError::NotLoaded) => {
                debug!(
                    component = "deep_analyzer",
                    record = %record.id,
                    held = handle.generation(),
                    "Refreshing model handle before analysis"
                );
                match self.model.load().await {
                    Ok(fresh) => {
                        *handle = fresh;
                        Self::settle(self.run(record, handle).await)
                    }
                    Err(e) => Self::model_failure(e),
                }
            }
            other => Self::settle(other),
        }
    }

    async fn run(&self, record: &Record, handle: &ModelHandle) -> GateResult {
        let timeout = self.timeout;
        self.model
            .with_exclusive_access(handle, |backend| async move {
                tokio::time::timeout(timeout, backend.analyze(record)).await
            })
            .await
    }

    fn settle(result: GateResult) -> AnalysisOutcome {
        match result {
            Ok(Ok(Ok(findings))) => AnalysisOutcome::Findings(findings),
            Ok(Ok(Err(InferenceError::ResourceExhausted { detail }))) => {
                AnalysisOutcome::ResourceExhausted { detail }
            }
            Ok(Ok(Err(InferenceError::Timeout))) | Ok(Err(_)) => AnalysisOutcome::Timeout,
            Ok(Ok(Err(InferenceError::Failed { reason }))) => AnalysisOutcome::Failed { reason },
            Err(e) => {
                warn!(component = "deep_analyzer", error = %e, "Model unavailable for analysis");
                Self::model_failure(e)
            }
        }
    }

    fn model_failure(error: ModelError) -> AnalysisOutcome {
        match error {
            ModelError::ResourceExhausted { detail } => AnalysisOutcome::ResourceExhausted { detail },
            other => AnalysisOutcome::Failed {
                reason: other.to_string(),
            },
        }
    }
}
