//! Pipeline orchestrator
//!
//! Drives each selected record through relevance filtering, deep analysis and
//! gene validation, applies the failure policy of every stage, keeps the
//! progress tracker current at every transition and persists final outcomes.
//! A single sequential loop runs per job; concurrent jobs share the model
//! through its exclusive gate.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shared::{job_debug, job_error, job_info, job_warn, JobKey, JobStatus, StageLabel, StageStatus};

use crate::config::PipelineConfig;
use crate::core::{Disposition, Record, RecordId, RecordMachine, RecordOutcome, RecordState, RunReport, StageOutcome};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::health::{HealthChecker, Readiness};
use crate::model::{ModelHandle, ModelLifecycleManager};
use crate::progress::ProgressTracker;
use crate::stages::{AnalysisOutcome, DeepAnalyzer, FilterOutcome, GeneValidator, RelevanceStage, ValidationOutcome};
use crate::traits::{DurableStore, FastStore, GeneRegistry, RecordStore, RelevanceFilter, VisionBackend, WriteResult};

/// Cooperative stop flag, checked between records.
///
/// A request is consumed by the run that halts on it, so the next run of the
/// same orchestrator resumes normally.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a pending request, returning whether one was set
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-run a job whose progress already says `processed`
    pub force: bool,
}

/// What the run loop does after a record
#[derive(Debug, Clone, PartialEq, Eq)]
enum RecordFlow {
    Continue,
    Halt { reason: String },
}

/// Per-record bookkeeping: state machine plus the stage outcomes so far
struct RecordTrail {
    id: RecordId,
    machine: RecordMachine,
    stages: Vec<StageOutcome>,
}

impl RecordTrail {
    fn new(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            machine: RecordMachine::new(),
            stages: Vec::new(),
        }
    }

    fn outcome(&self, disposition: Disposition) -> RecordOutcome {
        RecordOutcome {
            record_id: self.id.clone(),
            disposition,
            stages: self.stages.clone(),
            genes: Vec::new(),
            genes_validated: false,
            findings: None,
            error: None,
            completed_at: Utc::now(),
        }
    }

    fn failed(&self, error: impl Into<String>) -> RecordOutcome {
        RecordOutcome {
            error: Some(error.into()),
            ..self.outcome(Disposition::Error)
        }
    }
}

/// Main orchestrator that drives pipeline runs
pub struct Orchestrator<R, B, G, S, F, D>
where
    R: RelevanceFilter + 'static,
    B: VisionBackend + 'static,
    G: GeneRegistry + 'static,
    S: RecordStore + 'static,
    F: FastStore + 'static,
    D: DurableStore + 'static,
{
    config: PipelineConfig,
    health: HealthChecker,
    relevance: RelevanceStage<R>,
    analyzer: DeepAnalyzer<B>,
    validator: GeneValidator<G>,
    records: Arc<S>,
    tracker: Arc<ProgressTracker<F, D>>,
    stop: StopSignal,
}

impl<R, B, G, S, F, D> Orchestrator<R, B, G, S, F, D>
where
    R: RelevanceFilter + 'static,
    B: VisionBackend + 'static,
    G: GeneRegistry + 'static,
    S: RecordStore + 'static,
    F: FastStore + 'static,
    D: DurableStore + 'static,
{
    /// Create a new orchestrator with injected collaborators
    pub fn new(
        config: PipelineConfig,
        filter: Arc<R>,
        model: Arc<ModelLifecycleManager<B>>,
        registry: Arc<G>,
        records: Arc<S>,
        tracker: Arc<ProgressTracker<F, D>>,
    ) -> Self {
        Self {
            relevance: RelevanceStage::new(filter, config.filter_timeout),
            analyzer: DeepAnalyzer::new(model, config.analysis_timeout),
            validator: GeneValidator::new(registry, config.registry_timeout, config.gene_lookup_delay),
            health: HealthChecker::new(),
            records,
            tracker,
            stop: StopSignal::new(),
            config,
        }
    }

    pub fn with_health_checker(mut self, health: HealthChecker) -> Self {
        self.health = health;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker<F, D>> {
        &self.tracker
    }

    pub fn model(&self) -> &Arc<ModelLifecycleManager<B>> {
        self.analyzer.model()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one job.
    ///
    /// Returns `Err` only when the run cannot start (`NotReady`) or a store
    /// write fails; per-record failures and halts are reported in the
    /// [`RunReport`].
    pub async fn run(&self, key: &JobKey, options: RunOptions) -> OrchestratorResult<RunReport> {
        let mut report = RunReport::new(key.clone());
        job_info!(key, run_id = %report.run_id, force = options.force, "🚀 Starting pipeline run");

        if let Readiness::Unready { reason } = self.health.check().await {
            job_error!(key, reason = %reason, "❌ Prerequisites not met, run not started");
            return Err(OrchestratorError::NotReady { reason });
        }

        if !options.force {
            if let Some(snapshot) = self.tracker.read(key).await? {
                if snapshot.entry.status == JobStatus::Processed {
                    job_info!(key, "⏭️ Job already processed, nothing to do");
                    report.total = snapshot.entry.records_total;
                    report.skipped_final = snapshot.entry.records_done;
                    report.finish(JobStatus::Processed);
                    return Ok(report);
                }
            }
        }

        let (selected, settled): (Vec<Record>, Vec<Record>) = self
            .records
            .fetch_records(key)
            .await?
            .into_iter()
            .partition(|record| record.disposition.needs_processing());
        report.total = selected.len() + settled.len();
        report.skipped_final = settled.len();
        self.tracker.init(key, report.total, settled.len()).await?;
        job_info!(
            key,
            selected = selected.len(),
            already_final = settled.len(),
            "📋 Records selected for processing"
        );

        if selected.is_empty() {
            return self.complete(key, report).await;
        }

        let mut handle = match self.analyzer.model().load().await {
            Ok(handle) => handle,
            Err(e) => {
                return self
                    .halt(key, report, format!("vision model could not be loaded: {e}"))
                    .await
            }
        };

        self.tracker
            .set_job_status(key, JobStatus::InProgress, None)
            .await?;
        report.status = JobStatus::InProgress;

        let count = selected.len();
        for (index, record) in selected.iter().enumerate() {
            if self.stop.take() {
                return self.halt(key, report, "stop requested".to_string()).await;
            }

            report.attempted += 1;
            job_debug!(key, record = %record.id, position = index + 1, count, "Processing record");
            if let RecordFlow::Halt { reason } = self
                .process_record(key, record, &mut handle, &mut report)
                .await?
            {
                return self.halt(key, report, reason).await;
            }

            if index + 1 < count {
                let delay = self.config.pacing.next_delay();
                if !delay.is_zero() {
                    job_debug!(key, delay_ms = delay.as_millis() as u64, "Pacing before next record");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.complete(key, report).await
    }

    async fn process_record(
        &self,
        key: &JobKey,
        record: &Record,
        handle: &mut ModelHandle,
        report: &mut RunReport,
    ) -> OrchestratorResult<RecordFlow> {
        self.tracker.begin_record(key, record.id.as_str()).await?;
        let mut trail = RecordTrail::new(record);

        // Stage 1: relevance filter
        trail.machine.advance(RecordState::Stage1Running)?;
        self.mark(key, &mut trail, StageLabel::RelevanceFilter, StageStatus::Processing, None)
            .await?;
        match self.relevance.classify(record).await {
            FilterOutcome::Keep => {
                self.mark(key, &mut trail, StageLabel::RelevanceFilter, StageStatus::Processed, None)
                    .await?;
            }
            FilterOutcome::Discard => {
                self.mark(key, &mut trail, StageLabel::RelevanceFilter, StageStatus::FilteredOut, None)
                    .await?;
                trail.machine.advance(RecordState::FilteredOut)?;
                report.filtered += 1;
                job_info!(key, record = %record.id, "🚫 Filtered out: not a disease pathway figure");
                let outcome = trail.outcome(Disposition::FilteredOut);
                self.finish_record(key, trail, outcome).await?;
                return Ok(RecordFlow::Continue);
            }
            FilterOutcome::Timeout => {
                let detail = "classifier timed out";
                report.timeouts += 1;
                self.skip_record(key, trail, StageLabel::RelevanceFilter, detail, report)
                    .await?;
                return Ok(RecordFlow::Continue);
            }
            FilterOutcome::Critical { reason } => {
                let detail = format!("classifier critical failure: {reason}");
                self.mark(key, &mut trail, StageLabel::RelevanceFilter, StageStatus::Error, Some(detail.clone()))
                    .await?;
                trail.machine.advance(RecordState::Failed)?;
                report.critical += 1;
                report.errored += 1;
                let outcome = trail.failed(detail.clone());
                self.finish_record(key, trail, outcome).await?;
                return Ok(RecordFlow::Halt {
                    reason: format!("{detail} (record {})", record.id),
                });
            }
        }

        // Stage 2: deep analysis under the exclusive gate
        trail.machine.advance(RecordState::Stage2Running)?;
        self.mark(key, &mut trail, StageLabel::DeepAnalysis, StageStatus::Processing, None)
            .await?;
        let mut analysis = self.analyzer.analyze(record, handle).await;

        let exhausted = match &analysis {
            AnalysisOutcome::ResourceExhausted { detail } => Some(detail.clone()),
            _ => None,
        };
        if let Some(detail) = exhausted {
            self.mark(key, &mut trail, StageLabel::DeepAnalysis, StageStatus::Error, Some(detail.clone()))
                .await?;
            trail.machine.advance(RecordState::Stage2Error)?;
            job_warn!(key, record = %record.id, detail = %detail, "⚠️ GPU memory exhausted, starting recovery");

            match self.analyzer.model().recover(handle).await {
                Ok(fresh) => {
                    *handle = fresh;
                    report.recoveries += 1;
                    job_info!(key, record = %record.id, generation = fresh.generation(), "♻️ Model recovered, retrying deep analysis");
                    trail.machine.advance(RecordState::Stage2Running)?;
                    self.mark(key, &mut trail, StageLabel::DeepAnalysis, StageStatus::Processing, None)
                        .await?;
                    analysis = self.analyzer.analyze(record, handle).await;
                }
                Err(e) => {
                    let reason = format!("GPU recovery failed: {e}");
                    trail.machine.advance(RecordState::Failed)?;
                    report.errored += 1;
                    let outcome = trail.failed(reason.clone());
                    self.finish_record(key, trail, outcome).await?;
                    return Ok(RecordFlow::Halt { reason });
                }
            }
        }

        let findings = match analysis {
            AnalysisOutcome::Findings(findings) => {
                self.mark(key, &mut trail, StageLabel::DeepAnalysis, StageStatus::Processed, None)
                    .await?;
                findings
            }
            AnalysisOutcome::ResourceExhausted { detail } => {
                // Exhausted again right after a recovery
                let reason = format!("GPU memory still exhausted after recovery: {detail}");
                self.mark(key, &mut trail, StageLabel::DeepAnalysis, StageStatus::Error, Some(detail))
                    .await?;
                trail.machine.advance(RecordState::Failed)?;
                report.errored += 1;
                let outcome = trail.failed(reason.clone());
                self.finish_record(key, trail, outcome).await?;
                return Ok(RecordFlow::Halt { reason });
            }
            AnalysisOutcome::Timeout => {
                report.timeouts += 1;
                self.skip_record(key, trail, StageLabel::DeepAnalysis, "vision model timed out", report)
                    .await?;
                return Ok(RecordFlow::Continue);
            }
            AnalysisOutcome::Failed { reason } => {
                let detail = format!("analysis failed: {reason}");
                self.skip_record(key, trail, StageLabel::DeepAnalysis, &detail, report)
                    .await?;
                return Ok(RecordFlow::Continue);
            }
        };

        if !findings.has_candidate_genes() {
            // Nothing for the registry to check
            self.mark(key, &mut trail, StageLabel::GeneValidation, StageStatus::Processing, None)
                .await?;
            self.mark(
                key,
                &mut trail,
                StageLabel::GeneValidation,
                StageStatus::Processed,
                Some("no candidate genes".to_string()),
            )
            .await?;
            trail.machine.advance(RecordState::NoGenesFound)?;
            report.processed += 1;
            job_info!(key, record = %record.id, "✅ Processed: no candidate genes");
            let outcome = RecordOutcome {
                findings: Some(findings),
                ..trail.outcome(Disposition::Processed)
            };
            self.finish_record(key, trail, outcome).await?;
            return Ok(RecordFlow::Continue);
        }

        // Stage 3: gene validation
        trail.machine.advance(RecordState::Stage3Running)?;
        self.mark(key, &mut trail, StageLabel::GeneValidation, StageStatus::Processing, None)
            .await?;
        let (genes, genes_validated) = match self.validator.validate(&findings.genes).await {
            ValidationOutcome::Validated(genes) => {
                self.mark(key, &mut trail, StageLabel::GeneValidation, StageStatus::Processed, None)
                    .await?;
                trail.machine.advance(RecordState::GenesValidated)?;
                report.genes_validated += genes.len();
                job_info!(
                    key,
                    record = %record.id,
                    candidates = findings.genes.len(),
                    validated = genes.len(),
                    "✅ Processed: {}",
                    genes.join(", ")
                );
                (genes, true)
            }
            ValidationOutcome::Timeout => {
                self.mark(
                    key,
                    &mut trail,
                    StageLabel::GeneValidation,
                    StageStatus::Error,
                    Some("registry timed out, genes left unvalidated".to_string()),
                )
                .await?;
                trail.machine.advance(RecordState::GenesUnvalidated)?;
                report.timeouts += 1;
                job_warn!(key, record = %record.id, "⏱️ Registry timed out, keeping unvalidated genes");
                (findings.genes.clone(), false)
            }
        };

        report.processed += 1;
        let outcome = RecordOutcome {
            genes,
            genes_validated,
            findings: Some(findings),
            ..trail.outcome(Disposition::Processed)
        };
        self.finish_record(key, trail, outcome).await?;
        Ok(RecordFlow::Continue)
    }

    /// Update live and durable progress, and remember the stage outcome
    async fn mark(
        &self,
        key: &JobKey,
        trail: &mut RecordTrail,
        stage: StageLabel,
        status: StageStatus,
        detail: Option<String>,
    ) -> OrchestratorResult<()> {
        self.tracker.update(key, stage, status).await?;
        trail.stages.push(StageOutcome::new(stage, status, detail));
        Ok(())
    }

    /// Recoverable per-record failure: mark the stage, record the error, move on
    async fn skip_record(
        &self,
        key: &JobKey,
        mut trail: RecordTrail,
        stage: StageLabel,
        detail: &str,
        report: &mut RunReport,
    ) -> OrchestratorResult<()> {
        self.mark(key, &mut trail, stage, StageStatus::Error, Some(detail.to_string()))
            .await?;
        trail.machine.advance(RecordState::Failed)?;
        report.errored += 1;
        job_warn!(key, record = %trail.id, stage = %stage, "⏭️ Skipping record: {}", detail);
        let outcome = trail.failed(detail);
        self.finish_record(key, trail, outcome).await
    }

    /// Persist the final outcome and count the record as done
    async fn finish_record(
        &self,
        key: &JobKey,
        mut trail: RecordTrail,
        outcome: RecordOutcome,
    ) -> OrchestratorResult<()> {
        match self.records.write_outcome(key, &outcome).await? {
            WriteResult::Written => {
                job_debug!(key, record = %trail.id, disposition = %outcome.disposition, "Final outcome written");
            }
            WriteResult::Unchanged => {
                job_debug!(key, record = %trail.id, "Record already final, outcome left unchanged");
            }
        }
        self.tracker.record_finished(key).await?;
        trail.machine.advance(RecordState::RecordUpdated)?;
        Ok(())
    }

    async fn complete(&self, key: &JobKey, mut report: RunReport) -> OrchestratorResult<RunReport> {
        self.tracker
            .set_job_status(key, JobStatus::Processed, None)
            .await?;
        report.finish(JobStatus::Processed);
        report.log_summary();
        Ok(report)
    }

    /// Fatal condition: mark the job stopped; unattempted records stay pending
    async fn halt(&self, key: &JobKey, mut report: RunReport, reason: String) -> OrchestratorResult<RunReport> {
        job_error!(key, reason = %reason, "🛑 Halting pipeline run");
        self.tracker
            .set_job_status(key, JobStatus::Stopped, Some(reason.clone()))
            .await?;
        report.halt_reason = Some(reason);
        report.finish(JobStatus::Stopped);
        report.log_summary();
        Ok(report)
    }
}
