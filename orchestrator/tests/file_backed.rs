//! Pipeline runs against the file-backed durable stores

use std::path::Path;
use std::sync::Arc;

use orchestrator::core::{Disposition, Findings};
use orchestrator::services::{FileDurableStore, FileRecordStore, InMemoryFastStore};
use orchestrator::traits::{
    MockGeneRegistry, MockRelevanceFilter, MockVisionBackend, RecordStore, Relevance,
};
use orchestrator::{
    ModelLifecycleManager, Orchestrator, PipelineConfig, ProgressTracker, RunOptions, RunReport,
};
use shared::{JobKey, JobStatus};

mod common;
use common::TestFixtures;

/// Run one job in a fresh process-like setup: new fast store, shared data dir
async fn run_job(data_dir: &Path, key: &JobKey) -> RunReport {
    let config = PipelineConfig::immediate();

    let mut filter = MockRelevanceFilter::new();
    filter.expect_classify().returning(|_| Ok(Relevance::Keep));
    let mut backend = MockVisionBackend::new();
    backend.expect_allocate().returning(|| Ok(()));
    backend.expect_release().returning(|| Ok(()));
    backend
        .expect_analyze()
        .returning(|_| Ok(Findings::default()));
    let registry = MockGeneRegistry::new();

    let tracker = Arc::new(ProgressTracker::new(
        Arc::new(InMemoryFastStore::new()),
        Arc::new(FileDurableStore::new(data_dir)),
        config.live_ttl,
        config.durable_retention,
    ));
    let model = Arc::new(ModelLifecycleManager::new(
        Arc::new(backend),
        config.recovery,
        config.gate_wait_warning,
    ));

    Orchestrator::new(
        config,
        Arc::new(filter),
        model,
        Arc::new(registry),
        Arc::new(FileRecordStore::new(data_dir)),
        tracker,
    )
    .run(key, RunOptions::default())
    .await
    .unwrap()
}

#[tokio::test]
async fn test_jobs_with_similar_names_keep_separate_state() {
    let dir = tempfile::tempdir().unwrap();
    let alpha = JobKey::new("TNF-α", "psoriasis");
    let beta = JobKey::new("TNF-β", "psoriasis");
    let records = FileRecordStore::new(dir.path());

    records
        .import_records(&alpha, TestFixtures::records(&["a-1"]))
        .await
        .unwrap();
    let first = run_job(dir.path(), &alpha).await;
    assert_eq!(first.status, JobStatus::Processed);
    assert_eq!(first.attempted, 1);

    records
        .import_records(&beta, TestFixtures::records(&["b-1"]))
        .await
        .unwrap();
    let second = run_job(dir.path(), &beta).await;
    assert_eq!(second.status, JobStatus::Processed);
    assert_eq!(second.attempted, 1);
    assert_eq!(second.skipped_final, 0);

    let beta_records = records.fetch_records(&beta).await.unwrap();
    assert_eq!(beta_records.len(), 1);
    assert_eq!(beta_records[0].id.as_str(), "b-1");
    assert_eq!(beta_records[0].disposition, Disposition::Processed);

    let alpha_records = records.fetch_records(&alpha).await.unwrap();
    assert_eq!(alpha_records.len(), 1);
    assert_eq!(alpha_records[0].id.as_str(), "a-1");
}

#[tokio::test]
async fn test_finished_job_is_skipped_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = TestFixtures::key();
    FileRecordStore::new(dir.path())
        .import_records(&key, TestFixtures::records(&["fig-1", "fig-2"]))
        .await
        .unwrap();

    let first = run_job(dir.path(), &key).await;
    assert_eq!(first.attempted, 2);

    // Live store is gone; the durable entry still says processed
    let second = run_job(dir.path(), &key).await;
    assert_eq!(second.status, JobStatus::Processed);
    assert_eq!(second.attempted, 0);
    assert_eq!(second.skipped_final, 2);
}
