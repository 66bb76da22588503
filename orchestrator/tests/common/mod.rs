//! Common test utilities and infrastructure
//!
//! Shared fixtures, a recording fast store and the orchestrator builder used
//! by every orchestrator test suite.
#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{Harness, OrchestratorBuilder, RecordingFastStore, Script};
