//! Shared types for the pathway figure analysis system
//!
//! Holds the job, stage and progress types that both the pipeline
//! orchestrator and the progress endpoint speak, plus the common tracing setup.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
