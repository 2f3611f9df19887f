///
/// This module implements the CLI interface for hf-bucket: command parsing, wiring of the core
/// pipeline components, and user-visible output.
///
/// All transfer logic (admission, queued execution, repository sweeps) lives in the
/// [`hf-bucket-core`] crate. This module only builds the collaborators a command needs from the
/// loaded [`AppConfig`] and hands them to the core.
///
/// ## How To Use
/// - For command-line users: use the installed `hf-bucket` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`hf-bucket-core`]: ../../hf-bucket-core/
use crate::api;
use crate::load_config::{load_config, AppConfig};
use crate::remote::AdmissionClient;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hf_bucket_core::consumer::{run_consumer, QueueConsumer};
use hf_bucket_core::contract::Submitter;
use hf_bucket_core::direct::DirectSubmitter;
use hf_bucket_core::hub::HubClient;
use hf_bucket_core::job::{RepoRef, RepoType, SyncSummary, TransferOutcome};
use hf_bucket_core::producer::JobProducer;
use hf_bucket_core::queue::SqliteQueue;
use hf_bucket_core::storage::BucketTransfer;
use hf_bucket_core::synchronise::Synchroniser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// CLI for hf-bucket: mirror Hugging Face Hub files into an S3-compatible bucket.
#[derive(Parser)]
#[clap(
    name = "hf-bucket",
    version,
    about = "Queue, transfer and sync Hugging Face Hub files into an S3-compatible bucket"
)]
pub struct Cli {
    /// Path to an optional YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

/// How a file gets into the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Via {
    /// Stream it now, from this process
    Direct,
    /// Admit a job into the local SQLite queue
    Queue,
    /// POST it to a running admission API at WORKER_URL
    Remote,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the admission API
    Serve {
        /// Listen address, e.g. 0.0.0.0:8787
        #[clap(long)]
        bind: Option<String>,
        /// Also run the queue consumer in this process
        #[clap(long)]
        with_consumer: bool,
    },
    /// Run the queue consumer until Ctrl-C
    Consume,
    /// Mirror every file of a Hub repository
    Sync {
        /// Repository id, e.g. `squad` or `bert-base-uncased`
        repo_id: String,
        /// `dataset` or `model`
        #[clap(default_value = "dataset")]
        repo_type: RepoType,
        /// Bucket prefix; defaults to `datasets` or `models`
        #[clap(long)]
        prefix: Option<String>,
        #[clap(long, value_enum, default_value = "direct")]
        via: Via,
        /// Files submitted at a time
        #[clap(long)]
        concurrency: Option<usize>,
    },
    /// Transfer or admit a single file
    Submit {
        hf_url: String,
        r2_path: String,
        #[clap(long, value_enum, default_value = "direct")]
        via: Via,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            bind,
            with_consumer,
        } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            serve(&config, &bind, with_consumer).await
        }
        Commands::Consume => consume(&config).await,
        Commands::Sync {
            repo_id,
            repo_type,
            prefix,
            via,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.sync.concurrency = concurrency;
            }
            let repo = RepoRef::new(repo_id, repo_type);
            info!(command = "sync", repo_id = %repo.repo_id, ?via, "Starting repository sync");
            match via {
                Via::Direct => sync(&config, direct_submitter(&config)?, &repo, prefix).await,
                Via::Queue => sync(&config, queue_submitter(&config).await?, &repo, prefix).await,
                Via::Remote => sync(&config, remote_submitter(&config)?, &repo, prefix).await,
            }
        }
        Commands::Submit {
            hf_url,
            r2_path,
            via,
        } => {
            info!(command = "submit", %hf_url, %r2_path, ?via, "Submitting single file");
            let outcome = match via {
                Via::Direct => direct_submitter(&config)?.submit(&hf_url, &r2_path).await,
                Via::Queue => {
                    queue_submitter(&config)
                        .await?
                        .submit(&hf_url, &r2_path)
                        .await
                }
                Via::Remote => remote_submitter(&config)?.submit(&hf_url, &r2_path).await,
            };
            report_outcome(outcome)
        }
    }
}

fn direct_submitter(config: &AppConfig) -> Result<DirectSubmitter<BucketTransfer>> {
    let storage = config.require_storage()?;
    let transfer = BucketTransfer::new(&storage).context("Failed to build bucket client")?;
    Ok(DirectSubmitter::new(
        transfer,
        storage.bucket,
        config.consumer.transfer_timeout(),
    ))
}

async fn queue_submitter(config: &AppConfig) -> Result<JobProducer<SqliteQueue>> {
    let queue = SqliteQueue::connect(&config.queue)
        .await
        .with_context(|| format!("Failed to open queue {:?}", config.queue.sqlite_path))?;
    Ok(JobProducer::new(queue, config.source.clone()))
}

fn remote_submitter(config: &AppConfig) -> Result<AdmissionClient> {
    AdmissionClient::new(&config.require_worker_url()?)
}

async fn sync<S: Submitter>(
    config: &AppConfig,
    submitter: S,
    repo: &RepoRef,
    prefix: Option<String>,
) -> Result<()> {
    let lister = HubClient::new(&config.hub).context("Failed to build Hub client")?;
    let synchroniser =
        Synchroniser::new(lister, submitter, config.hub.clone(), config.sync.clone());

    let results = synchroniser
        .sync_repository(&repo.repo_id, repo.repo_type, prefix.as_deref())
        .await?;

    for result in &results {
        if let TransferOutcome::Failure { error } = &result.result {
            println!("❌ Failed: {} → {}", result.file, error);
        }
    }
    let summary = SyncSummary::from_results(repo.clone(), &results);
    println!("{summary}");

    if summary.failed() > 0 {
        error!(command = "sync", failed = summary.failed(), "Sync finished with failures");
        bail!("{} of {} files failed", summary.failed(), summary.total);
    }
    info!(command = "sync", "Sync complete");
    Ok(())
}

fn report_outcome(outcome: TransferOutcome) -> Result<()> {
    match outcome {
        TransferOutcome::Success {
            message, job_id, ..
        } => {
            println!("✅ {message}");
            if let Some(job_id) = job_id {
                println!("job_id: {job_id}");
            }
            Ok(())
        }
        TransferOutcome::Failure { error } => bail!(error),
    }
}

async fn serve(config: &AppConfig, bind: &str, with_consumer: bool) -> Result<()> {
    let queue = SqliteQueue::connect(&config.queue)
        .await
        .with_context(|| format!("Failed to open queue {:?}", config.queue.sqlite_path))?;
    let producer = Arc::new(JobProducer::new(queue.clone(), config.source.clone()));
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let router = api::build_router(producer);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    info!(command = "serve", %bind, with_consumer, "Starting admission API");
    if with_consumer {
        let transfer = BucketTransfer::new(&config.require_storage()?)
            .context("Failed to build bucket client")?;
        let consumer = QueueConsumer::new(transfer, config.consumer.clone());
        let (served, ()) = tokio::join!(
            api::serve(listener, router, stopped(stop_rx.clone())),
            run_consumer(&queue, &consumer, stopped(stop_rx)),
        );
        served.context("Admission API failed")?;
    } else {
        api::serve(listener, router, stopped(stop_rx))
            .await
            .context("Admission API failed")?;
    }
    info!(command = "serve", "Shut down");
    Ok(())
}

async fn consume(config: &AppConfig) -> Result<()> {
    let storage = config.require_storage()?;
    let queue = SqliteQueue::connect(&config.queue)
        .await
        .with_context(|| format!("Failed to open queue {:?}", config.queue.sqlite_path))?;
    let transfer = BucketTransfer::new(&storage).context("Failed to build bucket client")?;
    let consumer = QueueConsumer::new(transfer, config.consumer.clone());

    info!(command = "consume", "Starting queue consumer");
    run_consumer(&queue, &consumer, shutdown_signal()).await;
    Ok(())
}

fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _stopped = rx.wait_for(|stop| *stop).await.is_ok();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            error!(error = %e, "Cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
