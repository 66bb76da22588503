//! Stage adapters
//!
//! Each adapter wraps one collaborator with its timeout and folds every
//! expected result into a typed outcome. Filtering a record out or finding
//! no valid genes is an outcome, never an error.

pub mod analysis;
pub mod relevance;
pub mod validation;

pub use analysis::{AnalysisOutcome, DeepAnalyzer};
pub use relevance::{FilterOutcome, RelevanceStage};
pub use validation::{GeneValidator, ValidationOutcome};
