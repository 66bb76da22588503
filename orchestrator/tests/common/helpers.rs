//! Test helpers and builder patterns for orchestrator tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchestrator::core::{Disposition, Findings, Record};
use orchestrator::error::{ModelError, StoreError};
use orchestrator::services::{InMemoryDurableStore, InMemoryFastStore, InMemoryRecordStore};
use orchestrator::traits::{
    FastStore, InferenceError, MockGeneRegistry, MockRelevanceFilter, MockVisionBackend,
    RecordStore, Relevance,
};
use orchestrator::{
    HealthChecker, ModelLifecycleManager, Orchestrator, OrchestratorResult, PipelineConfig,
    ProgressTracker, RunOptions, RunReport,
};
use shared::{JobKey, ProgressEntry, ProgressSnapshot};

use super::fixtures::TestFixtures;

pub type TestOrchestrator = Orchestrator<
    MockRelevanceFilter,
    MockVisionBackend,
    MockGeneRegistry,
    InMemoryRecordStore,
    RecordingFastStore,
    InMemoryDurableStore,
>;

/// Scripted mock responses, consumed in call order
pub struct Script;

impl Script {
    pub fn analysis(
        steps: Vec<Result<Findings, InferenceError>>,
    ) -> impl FnMut(&Record) -> Result<Findings, InferenceError> + Send + 'static {
        let mut steps = VecDeque::from(steps);
        move |record| {
            steps
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted analysis left for {}", record.id))
        }
    }

    pub fn allocation(
        steps: Vec<Result<(), ModelError>>,
    ) -> impl FnMut() -> Result<(), ModelError> + Send + 'static {
        let mut steps = VecDeque::from(steps);
        move || steps.pop_front().expect("no scripted allocation left")
    }
}

/// Fast store that remembers every entry written to it
#[derive(Default)]
pub struct RecordingFastStore {
    inner: InMemoryFastStore,
    writes: Mutex<Vec<ProgressEntry>>,
}

impl RecordingFastStore {
    pub fn writes(&self) -> Vec<ProgressEntry> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FastStore for RecordingFastStore {
    async fn put(&self, key: &JobKey, entry: &ProgressEntry, ttl: Duration) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(entry.clone());
        self.inner.put(key, entry, ttl).await
    }

    async fn get(&self, key: &JobKey) -> Result<Option<ProgressEntry>, StoreError> {
        self.inner.get(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// A built orchestrator plus handles on everything it writes to
pub struct Harness {
    pub orchestrator: TestOrchestrator,
    pub key: JobKey,
    pub records: Arc<InMemoryRecordStore>,
    pub fast: Arc<RecordingFastStore>,
    pub durable: Arc<InMemoryDurableStore>,
    pub model: Arc<ModelLifecycleManager<MockVisionBackend>>,
}

impl Harness {
    pub async fn run(&self) -> OrchestratorResult<RunReport> {
        self.orchestrator.run(&self.key, RunOptions::default()).await
    }

    pub async fn record(&self, id: &str) -> Record {
        self.records
            .fetch_records(&self.key)
            .await
            .unwrap()
            .into_iter()
            .find(|record| record.id.as_str() == id)
            .unwrap_or_else(|| panic!("record {id} not stored"))
    }

    pub async fn disposition(&self, id: &str) -> Disposition {
        self.record(id).await.disposition
    }

    pub async fn progress(&self) -> ProgressSnapshot {
        self.orchestrator
            .tracker()
            .read(&self.key)
            .await
            .unwrap()
            .expect("progress entry exists")
    }
}

/// Builder for test orchestrators; unset collaborators get permissive defaults
pub struct OrchestratorBuilder {
    config: PipelineConfig,
    records: Vec<Record>,
    health: HealthChecker,
    filter: MockRelevanceFilter,
    filter_set: bool,
    backend: MockVisionBackend,
    lifecycle_set: bool,
    analysis_set: bool,
    registry: MockGeneRegistry,
    registry_set: bool,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::immediate(),
            records: Vec::new(),
            health: HealthChecker::new(),
            filter: MockRelevanceFilter::new(),
            filter_set: false,
            backend: MockVisionBackend::new(),
            lifecycle_set: false,
            analysis_set: false,
            registry: MockGeneRegistry::new(),
            registry_set: false,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = health;
        self
    }

    /// Configure the classifier mock with a setup function
    pub fn with_filter<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockRelevanceFilter),
    {
        setup(&mut self.filter);
        self.filter_set = true;
        self
    }

    /// Configure `allocate`/`release` on the vision backend mock
    pub fn with_lifecycle<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockVisionBackend),
    {
        setup(&mut self.backend);
        self.lifecycle_set = true;
        self
    }

    /// Configure `analyze` on the vision backend mock
    pub fn with_analysis<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockVisionBackend),
    {
        setup(&mut self.backend);
        self.analysis_set = true;
        self
    }

    /// Configure the gene registry mock with a setup function
    pub fn with_registry<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockGeneRegistry),
    {
        setup(&mut self.registry);
        self.registry_set = true;
        self
    }

    pub fn build(mut self) -> Harness {
        if !self.filter_set {
            self.filter
                .expect_classify()
                .returning(|_| Ok(Relevance::Keep));
        }
        if !self.lifecycle_set {
            self.backend.expect_allocate().returning(|| Ok(()));
            self.backend.expect_release().returning(|| Ok(()));
        }
        if !self.analysis_set {
            self.backend
                .expect_analyze()
                .returning(|_| Ok(Findings::default()));
        }
        if !self.registry_set {
            self.registry
                .expect_lookup()
                .returning(|candidate| Ok(Some(candidate.to_uppercase())));
        }

        let key = TestFixtures::key();
        let records = Arc::new(InMemoryRecordStore::with_records(key.clone(), self.records));
        let fast = Arc::new(RecordingFastStore::default());
        let durable = Arc::new(InMemoryDurableStore::new());
        let tracker = Arc::new(ProgressTracker::new(
            Arc::clone(&fast),
            Arc::clone(&durable),
            self.config.live_ttl,
            self.config.durable_retention,
        ));
        let model = Arc::new(ModelLifecycleManager::new(
            Arc::new(self.backend),
            self.config.recovery,
            self.config.gate_wait_warning,
        ));

        let orchestrator = Orchestrator::new(
            self.config,
            Arc::new(self.filter),
            Arc::clone(&model),
            Arc::new(self.registry),
            Arc::clone(&records),
            tracker,
        )
        .with_health_checker(self.health);

        Harness {
            orchestrator,
            key,
            records,
            fast,
            durable,
            model,
        }
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
