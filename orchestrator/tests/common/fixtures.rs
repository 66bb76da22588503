//! Test fixtures and data for orchestrator tests

use orchestrator::core::{Disposition, Findings, Record};
use orchestrator::error::ModelError;
use orchestrator::traits::InferenceError;
use shared::JobKey;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const TARGET: &'static str = "PAH";
    pub const DISEASE: &'static str = "phenylketonuria";
    pub const OOM_DETAIL: &'static str = "CUDA out of memory. Tried to allocate 2.00 GiB";

    pub fn key() -> JobKey {
        JobKey::new(Self::TARGET, Self::DISEASE)
    }

    pub fn record(id: &str) -> Record {
        Record::new(id, format!("https://figures.example/{id}.png"))
            .with_caption(format!("Pathway figure {id}"))
            .with_pmcid("PMC000001")
    }

    pub fn records(ids: &[&str]) -> Vec<Record> {
        ids.iter().map(|id| Self::record(id)).collect()
    }

    /// A record a previous run already settled (or failed on)
    pub fn record_with(id: &str, disposition: Disposition) -> Record {
        let mut record = Self::record(id);
        record.disposition = disposition;
        record
    }

    pub fn findings(genes: &[&str]) -> Result<Findings, InferenceError> {
        Ok(Findings::with_genes(genes.iter().copied()))
    }

    pub fn oom() -> Result<Findings, InferenceError> {
        Err(InferenceError::ResourceExhausted {
            detail: Self::OOM_DETAIL.to_string(),
        })
    }

    pub fn allocation_failure() -> Result<(), ModelError> {
        Err(ModelError::ResourceExhausted {
            detail: "Model loading failed: insufficient GPU memory".to_string(),
        })
    }
}
