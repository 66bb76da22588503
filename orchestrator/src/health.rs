//! Resource Health Checker
//!
//! Runs every registered [`ResourceProbe`] before a pipeline run starts. Any
//! failing probe makes the pipeline `Unready`; the orchestrator refuses to
//! start and the caller decides whether to try again later.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::ModelLifecycleManager;
use crate::progress::ProgressTracker;
use crate::services::FileRecordStore;
use crate::traits::{DurableStore, FastStore, ResourceProbe, VisionBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Unready { reason: String },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

#[derive(Default, Clone)]
pub struct HealthChecker {
    probes: Vec<Arc<dyn ResourceProbe>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn probe_names(&self) -> Vec<String> {
        self.probes.iter().map(|probe| probe.name()).collect()
    }

    /// Probe everything; the reason lists every failed prerequisite
    pub async fn check(&self) -> Readiness {
        let mut failures = Vec::new();
        for probe in &self.probes {
            let name = probe.name();
            match probe.probe().await {
                Ok(()) => debug!(component = "health", probe = %name, "✓ Prerequisite available"),
                Err(reason) => {
                    warn!(component = "health", probe = %name, reason = %reason, "✗ Prerequisite unavailable");
                    failures.push(format!("{name}: {reason}"));
                }
            }
        }

        if failures.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Unready {
                reason: failures.join("; "),
            }
        }
    }
}

/// Vision model server reachability
pub struct ModelProbe<B: VisionBackend> {
    model: Arc<ModelLifecycleManager<B>>,
}

impl<B: VisionBackend> ModelProbe<B> {
    pub fn new(model: Arc<ModelLifecycleManager<B>>) -> Self {
        Self { model }
    }
}

#[async_trait::async_trait]
impl<B: VisionBackend> ResourceProbe for ModelProbe<B> {
    fn name(&self) -> String {
        "vision-model".to_string()
    }

    async fn probe(&self) -> Result<(), String> {
        self.model.backend().probe().await
    }
}

/// Fast and durable progress store connectivity
pub struct ProgressStoreProbe<F: FastStore, D: DurableStore> {
    tracker: Arc<ProgressTracker<F, D>>,
}

impl<F: FastStore, D: DurableStore> ProgressStoreProbe<F, D> {
    pub fn new(tracker: Arc<ProgressTracker<F, D>>) -> Self {
        Self { tracker }
    }
}

#[async_trait::async_trait]
impl<F: FastStore, D: DurableStore> ResourceProbe for ProgressStoreProbe<F, D> {
    fn name(&self) -> String {
        "progress-stores".to_string()
    }

    async fn probe(&self) -> Result<(), String> {
        self.tracker.ping().await.map_err(|e| e.to_string())
    }
}

pub struct RecordStoreProbe {
    store: Arc<FileRecordStore>,
}

impl RecordStoreProbe {
    pub fn new(store: Arc<FileRecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ResourceProbe for RecordStoreProbe {
    fn name(&self) -> String {
        "record-store".to_string()
    }

    async fn probe(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }
}
