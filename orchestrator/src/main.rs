//! Main entry point for the figure orchestrator binary
//!
//! Wires the real collaborators (HTTP classifier, vision model server, NCBI
//! registry, file-backed stores) into the orchestrator, serves progress
//! in-process and runs one job.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;

use orchestrator::{
    core::Record,
    health::{HealthChecker, ModelProbe, ProgressStoreProbe, RecordStoreProbe},
    services::{
        CredentialProbe, EnvCredentialSource, FileDurableStore, FileRecordStore, HttpVisionBackend,
        InMemoryFastStore, NcbiGeneRegistry, OpenAiRelevanceFilter,
    },
    CredentialSource, ModelLifecycleManager, Orchestrator, PacingPolicy, PipelineConfig, ProgressTracker,
    RecordStore, RunOptions,
};
use shared::{job_info, logging, JobKey};
use webserver::ProgressServer;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Runs the pathway figure pipeline for one target/disease job
#[derive(Parser)]
#[command(name = "figure-orchestrator")]
#[command(about = "Classifies pathway figures, analyses them on the vision model and validates extracted genes")]
pub struct Args {
    /// Target (gene or drug) the job is scoped to
    #[arg(long)]
    pub target: String,

    /// Disease the job is scoped to
    #[arg(long)]
    pub disease: String,

    /// JSON array of records to add to the job before running
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// Directory holding durable progress and record outcomes
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Serve the progress endpoint on this address while the job runs
    #[arg(long)]
    pub progress_addr: Option<SocketAddr>,

    /// Keep serving progress this many seconds after the run ends
    #[arg(long, default_value_t = 0)]
    pub linger_secs: u64,

    /// Re-run a job that is already processed
    #[arg(long)]
    pub force: bool,

    /// Disable inter-record pacing
    #[arg(long)]
    pub no_pacing: bool,

    #[arg(long, env = "MODEL_SERVER_URL", default_value = "http://127.0.0.1:8000")]
    pub model_server_url: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    #[arg(long, env = "NCBI_BASE_URL", default_value = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils")]
    pub ncbi_base_url: String,

    /// Override the relevance filter timeout (T1)
    #[arg(long)]
    pub filter_timeout_secs: Option<u64>,

    /// Override the deep analysis timeout (T2)
    #[arg(long)]
    pub analysis_timeout_secs: Option<u64>,

    /// Override the whole-list gene validation timeout
    #[arg(long)]
    pub registry_timeout_secs: Option<u64>,
}

impl Args {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env()?;
        if let Some(secs) = self.filter_timeout_secs {
            config.filter_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.analysis_timeout_secs {
            config.analysis_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.registry_timeout_secs {
            config.registry_timeout = Duration::from_secs(secs);
        }
        if self.no_pacing {
            config.pacing = PacingPolicy::none();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup("orchestrator", "figure analysis pipeline");

    let config = args.pipeline_config()?;
    let key = JobKey::new(args.target.clone(), args.disease.clone());

    let credentials = EnvCredentialSource::new()
        .credentials()
        .await
        .map_err(|missing| anyhow!(missing.message))?;

    // Collaborators
    let filter = OpenAiRelevanceFilter::new(credentials.openai_api_key.clone(), config.filter_timeout)
        .context("building classifier client")?
        .with_base_url(&args.openai_base_url);
    let backend = HttpVisionBackend::new(
        &args.model_server_url,
        credentials.model_server_username.clone(),
        credentials.model_server_password.clone(),
        config.analysis_timeout,
    )
    .context("building vision model client")?;
    let registry = NcbiGeneRegistry::new(credentials.ncbi_api_key.clone(), config.registry_timeout)
        .context("building registry client")?
        .with_base_url(&args.ncbi_base_url);

    // Stores
    let record_store = Arc::new(FileRecordStore::new(&args.data_dir));
    let tracker = Arc::new(ProgressTracker::new(
        Arc::new(InMemoryFastStore::new()),
        Arc::new(FileDurableStore::new(&args.data_dir)),
        config.live_ttl,
        config.durable_retention,
    ));
    let model = Arc::new(ModelLifecycleManager::new(
        Arc::new(backend),
        config.recovery,
        config.gate_wait_warning,
    ));

    if let Some(path) = &args.records {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading records from {}", path.display()))?;
        let records: Vec<Record> = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing records from {}", path.display()))?;
        let added = record_store.import_records(&key, records).await?;
        job_info!(key, added, "📥 Records imported");
    }

    let health = HealthChecker::new()
        .with_probe(Arc::new(CredentialProbe::new(EnvCredentialSource::new())))
        .with_probe(Arc::new(ModelProbe::new(Arc::clone(&model))))
        .with_probe(Arc::new(ProgressStoreProbe::new(Arc::clone(&tracker))))
        .with_probe(Arc::new(RecordStoreProbe::new(Arc::clone(&record_store))));

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(filter),
        Arc::clone(&model),
        Arc::new(registry),
        record_store,
        Arc::clone(&tracker),
    )
    .with_health_checker(health);

    // Retention sweep at start-up, then periodically
    tracker.cleanup().await?;
    let cleanup_task = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = tracker.cleanup().await {
                    logging::log_error("orchestrator", "Progress cleanup", &e);
                }
            }
        })
    };

    // Progress endpoint
    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
    let server_task = args.progress_addr.map(|address| {
        let server = ProgressServer::new(Arc::clone(&tracker));
        tokio::spawn(async move {
            let shutdown = async {
                let _ = server_stop_rx.await;
            };
            if let Err(e) = server.serve(address, shutdown).await {
                logging::log_error("webserver", "Progress endpoint", &e);
            }
        })
    });

    // Ctrl+C stops the run between records
    let stop = orchestrator.stop_signal();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown("orchestrator", "Received Ctrl+C signal, stopping after the current record");
                stop.stop();
            }
            Err(err) => logging::log_error("orchestrator", "Signal handling", &err),
        }
    });

    let outcome = orchestrator
        .run(&key, RunOptions { force: args.force })
        .await;

    if let Some(handle) = model.current_handle().await {
        if let Err(e) = model.unload(&handle).await {
            logging::log_error("orchestrator", "Model unload", &e);
        }
    }

    if let Some(task) = server_task {
        if args.linger_secs > 0 {
            logging::log_progress(
                "webserver",
                "Lingering",
                &format!("serving final progress for {}s", args.linger_secs),
            );
            tokio::time::sleep(Duration::from_secs(args.linger_secs)).await;
        }
        let _ = server_stop_tx.send(());
        let _ = task.await;
    }
    cleanup_task.abort();

    let report = outcome?;
    if let Some(reason) = &report.halt_reason {
        bail!("run for {} stopped: {}", key, reason);
    }
    logging::log_success("orchestrator", &format!("Run for {key} complete"));
    Ok(())
}
