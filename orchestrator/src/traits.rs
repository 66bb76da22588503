//! Trait definitions with mockall annotations for testing
//!
//! Every external collaborator of the pipeline sits behind one of these
//! traits: the classifier, the GPU-resident vision model, the gene registry,
//! the two progress stores, the record store, health probes and credentials.
//! The orchestrator is generic over them so tests can inject mocks.

use chrono::{DateTime, Utc};
use shared::{JobKey, ProgressEntry};
use std::time::Duration;
use thiserror::Error;

use crate::core::{Findings, Record, RecordOutcome};
use crate::error::{ModelError, StoreError};

/// Stage 1 decision for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    Keep,
    Discard,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("classifier timed out")]
    Timeout,

    /// Auth rejection or malformed reply; halts the run
    #[error("classifier critical failure: {reason}")]
    Critical { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("GPU memory exhausted: {detail}")]
    ResourceExhausted { detail: String },

    #[error("inference timed out")]
    Timeout,

    #[error("inference failed: {reason}")]
    Failed { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry lookup timed out")]
    Timeout,

    #[error("registry unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Outcome of a final-outcome write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Written,
    /// The record already carried a final disposition
    Unchanged,
}

/// Credentials needed by the external collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub openai_api_key: String,
    pub model_server_username: String,
    pub model_server_password: String,
    pub ncbi_api_key: Option<String>,
}

/// Error when a required credential is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCredential {
    pub key_name: String,
    pub message: String,
}

/// Stage 1: lightweight classifier deciding whether a figure is a disease pathway
#[mockall::automock]
#[async_trait::async_trait]
pub trait RelevanceFilter: Send + Sync {
    async fn classify(&self, record: &Record) -> Result<Relevance, FilterError>;
}

/// The GPU-resident vision model.
///
/// Only the Model Lifecycle Manager calls `allocate`/`release`; `analyze` is
/// only ever invoked while the manager's exclusive gate is held.
#[mockall::automock]
#[async_trait::async_trait]
pub trait VisionBackend: Send + Sync {
    /// Load the model into GPU memory
    async fn allocate(&self) -> Result<(), ModelError>;

    /// Free GPU memory; releasing an unloaded model succeeds
    async fn release(&self) -> Result<(), ModelError>;

    async fn analyze(&self, record: &Record) -> Result<Findings, InferenceError>;

    /// Cheap reachability check used by the health checker
    async fn probe(&self) -> Result<(), String>;
}

/// Stage 3: external gene registry
#[mockall::automock]
#[async_trait::async_trait]
pub trait GeneRegistry: Send + Sync {
    /// Official symbol for `candidate`, or `None` when the registry does not
    /// know it as a live human gene
    async fn lookup(&self, candidate: &str) -> Result<Option<String>, RegistryError>;
}

/// Low-latency TTL-bounded progress store
#[mockall::automock]
#[async_trait::async_trait]
pub trait FastStore: Send + Sync {
    async fn put(&self, key: &JobKey, entry: &ProgressEntry, ttl: Duration) -> Result<(), StoreError>;

    /// `None` once the entry expired or was never written
    async fn get(&self, key: &JobKey) -> Result<Option<ProgressEntry>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Longer-retention progress store, authoritative once a live entry expires
#[mockall::automock]
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    async fn put(&self, key: &JobKey, entry: &ProgressEntry) -> Result<(), StoreError>;

    async fn get(&self, key: &JobKey) -> Result<Option<ProgressEntry>, StoreError>;

    /// Remove entries last updated before `cutoff`, returning how many went
    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Durable storage of records and their final outcomes
#[mockall::automock]
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_records(&self, key: &JobKey) -> Result<Vec<Record>, StoreError>;

    /// Persist a final outcome. A record that already carries a final
    /// disposition is left untouched.
    async fn write_outcome(&self, key: &JobKey, outcome: &RecordOutcome) -> Result<WriteResult, StoreError>;

    /// Add records not yet known for the job, returning how many were new
    async fn import_records(&self, key: &JobKey, records: Vec<Record>) -> Result<usize, StoreError>;
}

/// One prerequisite checked before a run starts
#[mockall::automock]
#[async_trait::async_trait]
pub trait ResourceProbe: Send + Sync {
    fn name(&self) -> String;

    async fn probe(&self) -> Result<(), String>;
}

/// Credential source abstraction for dependency injection
#[mockall::automock]
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, MissingCredential>;
}
