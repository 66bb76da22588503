//! Two jobs sharing one vision model must never run inference concurrently

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orchestrator::core::{Disposition, Findings, Record};
use orchestrator::error::ModelError;
use orchestrator::services::{InMemoryDurableStore, InMemoryFastStore, InMemoryRecordStore};
use orchestrator::traits::{
    InferenceError, MockGeneRegistry, MockRelevanceFilter, RecordStore, Relevance, VisionBackend,
};
use orchestrator::{
    ModelLifecycleManager, Orchestrator, PipelineConfig, ProgressTracker, RunOptions,
};
use shared::{JobKey, JobStatus};

mod common;
use common::TestFixtures;

/// Vision backend that tracks how many analyses overlap
#[derive(Default)]
struct CountingBackend {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl VisionBackend for CountingBackend {
    async fn allocate(&self) -> Result<(), ModelError> {
        Ok(())
    }

    async fn release(&self) -> Result<(), ModelError> {
        Ok(())
    }

    async fn analyze(&self, _record: &Record) -> Result<Findings, InferenceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Findings::with_genes(["IL6"]))
    }

    async fn probe(&self) -> Result<(), String> {
        Ok(())
    }
}

fn keep_everything() -> Arc<MockRelevanceFilter> {
    let mut filter = MockRelevanceFilter::new();
    filter
        .expect_classify()
        .returning(|_| Ok(Relevance::Keep));
    Arc::new(filter)
}

fn confirm_everything() -> Arc<MockGeneRegistry> {
    let mut registry = MockGeneRegistry::new();
    registry
        .expect_lookup()
        .returning(|candidate| Ok(Some(candidate.to_string())));
    Arc::new(registry)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_model_serializes_inference_across_jobs() {
    let config = PipelineConfig::immediate();
    let first = TestFixtures::key();
    let second = JobKey::new("IL6", "rheumatoid arthritis");

    let records = Arc::new(InMemoryRecordStore::with_records(
        first.clone(),
        TestFixtures::records(&["a-1", "a-2", "a-3", "a-4"]),
    ));
    records
        .import_records(&second, TestFixtures::records(&["b-1", "b-2", "b-3", "b-4"]))
        .await
        .unwrap();

    let tracker = Arc::new(ProgressTracker::new(
        Arc::new(InMemoryFastStore::new()),
        Arc::new(InMemoryDurableStore::new()),
        config.live_ttl,
        config.durable_retention,
    ));
    let backend = Arc::new(CountingBackend::default());
    let model = Arc::new(ModelLifecycleManager::new(
        Arc::clone(&backend),
        config.recovery,
        config.gate_wait_warning,
    ));

    let build = || {
        Orchestrator::new(
            config.clone(),
            keep_everything(),
            Arc::clone(&model),
            confirm_everything(),
            Arc::clone(&records),
            Arc::clone(&tracker),
        )
    };
    let (left, right) = (build(), build());

    let (left_report, right_report) = tokio::join!(
        left.run(&first, RunOptions::default()),
        right.run(&second, RunOptions::default()),
    );
    let (left_report, right_report) = (left_report.unwrap(), right_report.unwrap());

    assert_eq!(left_report.status, JobStatus::Processed);
    assert_eq!(right_report.status, JobStatus::Processed);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 8);
    assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    assert_eq!(model.recovery_count(), 0);

    for key in [&first, &second] {
        let stored = records.fetch_records(key).await.unwrap();
        assert!(stored
            .iter()
            .all(|record| record.disposition == Disposition::Processed));
        let progress = tracker.read(key).await.unwrap().unwrap();
        assert_eq!(progress.entry.status, JobStatus::Processed);
        assert_eq!(progress.entry.records_done, 4);
    }
}
