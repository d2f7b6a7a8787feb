use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bench_eval::admin::{self, Submission};
use bench_eval::config::{DatabaseConfig, StorageConfig, WorkerConfig};
use bench_eval::eval::{ImageStatus, Launcher, TokioProcessRunner, ensure_image};
use bench_eval::experiment::ExperimentStatus;
use bench_eval::shutdown::install_shutdown_handler;
use bench_eval::storage::PublicBucket;
use bench_eval::store::{ExperimentStore, LibSqlBackend};
use bench_eval::worker::{EvaluationWorker, Iteration, Staging, WorkerDeps};

#[derive(Parser, Debug)]
#[command(name = "bench-eval")]
#[command(version)]
#[command(about = "Evaluation worker and maintenance commands for benchmark submissions")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll for experiments and evaluate them one at a time
    Run,

    /// Evaluate at most one experiment and exit
    Once,

    /// Move every FAILED experiment back to PENDING
    RequeueFailed,

    /// Move every COMPLETED experiment to REPROCESS
    ReprocessCompleted,

    /// Make all experiments of a user public
    Publish {
        /// Owner id
        #[arg(long)]
        user: String,
    },

    /// Insert a PENDING experiment
    Submit {
        /// Owner id
        #[arg(long)]
        user: String,

        /// Submission name shown on the leaderboard
        #[arg(long)]
        name: String,

        /// Dataset label, e.g. "Single Object"
        #[arg(long)]
        dataset: String,

        /// Split label, e.g. "deformation_1-illumination-viewpoint"
        #[arg(long)]
        split: String,

        /// Storage key or URL of the matches file
        #[arg(long)]
        match_file: String,
    },

    /// Print experiments as JSON lines, newest first
    List {
        /// Only experiments in this status
        #[arg(long)]
        status: Option<ExperimentStatus>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let store = open_store().await?;

    match args.command {
        Commands::Run => {
            let worker = build_worker(Arc::clone(&store)).await?;
            let shutdown = install_shutdown_handler().context("installing signal handlers")?;
            worker.run(shutdown).await?;
        }
        Commands::Once => {
            let mut worker = build_worker(Arc::clone(&store)).await?;
            match worker.run_once().await? {
                Iteration::Idle => info!("No claimable experiments"),
                Iteration::Finished { id, status } => {
                    info!(experiment_id = %id, status = %status, "Iteration finished")
                }
            }
        }
        Commands::RequeueFailed => {
            let count = admin::requeue_failed(store.as_ref()).await?;
            println!("{count} experiment(s) moved from FAILED to PENDING");
        }
        Commands::ReprocessCompleted => {
            let count = admin::reprocess_completed(store.as_ref()).await?;
            println!("{count} experiment(s) moved from COMPLETED to REPROCESS");
        }
        Commands::Publish { user } => {
            let count = admin::publish_user_experiments(store.as_ref(), &user).await?;
            println!("{count} experiment(s) of {user} made public");
        }
        Commands::Submit {
            user,
            name,
            dataset,
            split,
            match_file,
        } => {
            let experiment = admin::submit(
                store.as_ref(),
                Submission {
                    user_id: user,
                    name,
                    dataset,
                    split,
                    match_file_url: match_file,
                },
            )
            .await?;
            println!("{}", experiment.id);
        }
        Commands::List { status } => {
            for experiment in admin::list(store.as_ref(), status).await? {
                println!("{}", serde_json::to_string(&experiment)?);
            }
        }
    }

    Ok(())
}

async fn open_store() -> anyhow::Result<Arc<dyn ExperimentStore>> {
    let backend = match DatabaseConfig::from_env()? {
        DatabaseConfig::Remote { url, auth_token } => LibSqlBackend::new_remote(&url, &auth_token)
            .await
            .with_context(|| format!("connecting to {url}"))?,
        DatabaseConfig::Local { path } => LibSqlBackend::new_local(&path)
            .await
            .with_context(|| format!("opening database at {}", path.display()))?,
    };
    Ok(Arc::new(backend))
}

async fn build_worker(store: Arc<dyn ExperimentStore>) -> anyhow::Result<EvaluationWorker> {
    let config = WorkerConfig::from_env()?;
    let storage_config = StorageConfig::from_env()?;

    if let Launcher::Docker {
        image,
        dockerfile_dir,
        ..
    } = &config.evaluator.launcher
    {
        if ensure_image(image, dockerfile_dir.as_deref()).await? == ImageStatus::Missing {
            warn!(image = %image, "Evaluations will fail until the image is available");
        }
    }

    let storage = PublicBucket::new(&storage_config.base_url, storage_config.fetch_timeout)?;
    info!(
        storage = %storage.base(),
        experiment_dir = %config.evaluator.experiment_dir.display(),
        dataset_dir = %config.evaluator.dataset_root.display(),
        "Worker configured"
    );

    let staging = Staging::new(config.evaluator.experiment_dir.clone());
    staging.ensure_dir().await?;

    let deps = WorkerDeps {
        store,
        storage: Arc::new(storage),
        runner: Arc::new(TokioProcessRunner::new()),
    };
    Ok(EvaluationWorker::new(
        deps,
        config.evaluator,
        staging,
        config.settings,
    ))
}
