//! Orchestrator library for the pathway figure analysis pipeline
//!
//! Records flow through three stages: a relevance filter, deep analysis on a
//! GPU-resident vision model and gene validation against a registry. The
//! orchestrator applies a fixed policy per failure class, recovers the model
//! from GPU memory exhaustion once, and keeps live and durable progress in step.

pub mod config;
pub mod core;
pub mod error;
pub mod health;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod services;
pub mod stages;
pub mod traits;

// Re-export commonly used types
pub use config::{PacingPolicy, PipelineConfig, RecoveryPolicy};
pub use self::core::{Disposition, Findings, Record, RecordId, RecordOutcome, RunReport};
pub use error::{ModelError, OrchestratorError, OrchestratorResult, StoreError};
pub use health::{HealthChecker, Readiness};
pub use model::{ModelHandle, ModelLifecycleManager};
pub use orchestrator::{Orchestrator, RunOptions, StopSignal};
pub use progress::ProgressTracker;
pub use traits::{
    CredentialSource, DurableStore, FastStore, GeneRegistry, RecordStore, RelevanceFilter,
    ResourceProbe, VisionBackend,
};
