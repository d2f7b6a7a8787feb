//! Evaluation worker: claims one experiment at a time and drives it to a
//! terminal status.
//!
//! One iteration:
//! 1. Claim the oldest `PENDING`/`REPROCESS` experiment
//! 2. Map its dataset label, fetch and stage the input artifact
//! 3. Spawn the evaluator; a successful spawn moves it to `PROCESSING`
//! 4. Wait for exit, read `{id}.out`, write `COMPLETED` or `FAILED`
//!
//! Failures of the experiment itself end in `FAILED` and the loop moves on.
//! Store errors propagate out of `run_once` and stop the worker.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, StorageError, WorkerError};
use crate::eval::invocation::{EvaluatorConfig, Invocation};
use crate::eval::runner::{ProcessRunner, SIGNAL_EXIT_CODE};
use crate::experiment::state::transition;
use crate::experiment::{
    CLAIMABLE, Dataset, EvaluationOutcome, Experiment, ExperimentId, ExperimentStatus,
    FailureReason, resolve,
};
use crate::storage::ObjectStorage;
use crate::store::ExperimentStore;
use crate::worker::staging::Staging;

/// Shared collaborators for the worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn ExperimentStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub runner: Arc<dyn ProcessRunner>,
}

/// Loop timing.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Sleep after an idle iteration.
    pub poll_interval: Duration,
    /// Delay between a clean exit and reading the output file.
    pub output_settle: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            output_settle: Duration::from_millis(1000),
        }
    }
}

/// Result of one `run_once` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    /// Nothing claimable.
    Idle,
    /// One experiment reached a terminal status.
    Finished {
        id: ExperimentId,
        status: ExperimentStatus,
    },
}

pub struct EvaluationWorker {
    deps: WorkerDeps,
    evaluator: EvaluatorConfig,
    staging: Staging,
    settings: WorkerSettings,
    /// The experiment between claim and terminal write, if any.
    in_flight: Option<ExperimentId>,
}

impl EvaluationWorker {
    pub fn new(
        deps: WorkerDeps,
        evaluator: EvaluatorConfig,
        staging: Staging,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            deps,
            evaluator,
            staging,
            settings,
            in_flight: None,
        }
    }

    pub fn in_flight(&self) -> Option<&ExperimentId> {
        self.in_flight.as_ref()
    }

    /// Run until `shutdown` fires. Shutdown is only observed between
    /// iterations; a running evaluation always finishes first.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            staging = %self.staging.dir().display(),
            "Evaluation worker started"
        );

        let orphaned = self
            .deps
            .store
            .count_by_status(ExperimentStatus::Processing)
            .await?;
        if orphaned > 0 {
            warn!(
                count = orphaned,
                "Experiments left in PROCESSING by an earlier run; they will not be picked up again"
            );
        }

        while !shutdown.is_cancelled() {
            match self.run_once().await? {
                Iteration::Finished { .. } => {}
                Iteration::Idle => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
            }
        }

        info!("Evaluation worker stopped");
        Ok(())
    }

    /// Claim and evaluate at most one experiment.
    pub async fn run_once(&mut self) -> Result<Iteration> {
        if let Some(id) = &self.in_flight {
            return Err(WorkerError::AlreadyInFlight { id: id.to_string() }.into());
        }

        let Some(experiment) = self
            .deps
            .store
            .find_claimable(CLAIMABLE, 1)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(Iteration::Idle);
        };

        info!(
            experiment_id = %experiment.id,
            name = %experiment.name,
            dataset = %experiment.dataset,
            split = %experiment.split,
            status = %experiment.status,
            "Claimed experiment"
        );

        // Left set if a store write fails: the row's state is unknown.
        self.in_flight = Some(experiment.id.clone());
        let status = self.evaluate(&experiment).await?;
        self.in_flight = None;

        Ok(Iteration::Finished {
            id: experiment.id,
            status,
        })
    }

    async fn evaluate(&self, experiment: &Experiment) -> Result<ExperimentStatus> {
        let id = &experiment.id;

        let invocation = match self.prepare(experiment).await {
            Ok(invocation) => invocation,
            Err(reason) => {
                return self
                    .finish(id, experiment.status, EvaluationOutcome::Aborted(reason))
                    .await;
            }
        };

        info!(experiment_id = %id, command = %invocation.display(), "Launching evaluator");
        let mut process = match self.deps.runner.spawn(&invocation).await {
            Ok(process) => process,
            Err(e) => {
                let outcome = EvaluationOutcome::LaunchFailed {
                    reason: e.to_string(),
                };
                return self.finish(id, experiment.status, outcome).await;
            }
        };

        let current = transition(experiment.status, ExperimentStatus::Processing)?;
        self.deps.store.update_status(id, current).await?;
        info!(experiment_id = %id, pid = ?process.pid(), "Evaluator running");

        let code = match process.wait().await {
            Ok(code) => code,
            Err(e) => {
                warn!(experiment_id = %id, error = %e, "Lost track of evaluator exit");
                SIGNAL_EXIT_CODE
            }
        };
        info!(experiment_id = %id, code, "Evaluator exited");

        let outcome = if code == 0 {
            tokio::time::sleep(self.settings.output_settle).await;
            EvaluationOutcome::CleanExit {
                output: self.staging.read_metrics(id).await,
            }
        } else {
            EvaluationOutcome::NonZeroExit { code }
        };

        self.finish(id, current, outcome).await
    }

    /// Dataset mapping and input staging. Any failure here aborts before launch.
    async fn prepare(
        &self,
        experiment: &Experiment,
    ) -> std::result::Result<Invocation, FailureReason> {
        let id = &experiment.id;

        let Some(dataset) = Dataset::from_label(&experiment.dataset) else {
            return Err(FailureReason::UnknownDataset {
                label: experiment.dataset.clone(),
            });
        };

        let transfer = |e: StorageError| FailureReason::Transfer(e.to_string());

        let url = self
            .deps
            .storage
            .resolve_url(&experiment.match_file_url)
            .await
            .map_err(transfer)?;
        let content = self.deps.storage.fetch_text(&url).await.map_err(transfer)?;

        self.staging.ensure_dir().await.map_err(transfer)?;
        let input = self.staging.write_input(id, &content).await.map_err(transfer)?;
        self.staging.clear_output(id).await.map_err(transfer)?;
        info!(
            experiment_id = %id,
            input = %input.display(),
            bytes = content.len(),
            "Input staged"
        );

        Ok(self.evaluator.invocation(id, dataset, &experiment.split))
    }

    /// Resolve the outcome and write the terminal status.
    async fn finish(
        &self,
        id: &ExperimentId,
        current: ExperimentStatus,
        outcome: EvaluationOutcome,
    ) -> Result<ExperimentStatus> {
        let resolution = resolve(current, outcome)?;

        match resolution.metrics {
            Some(metrics) => {
                self.deps.store.complete_experiment(id, metrics).await?;
                info!(
                    experiment_id = %id,
                    ms = metrics.ms,
                    ma = metrics.ma,
                    mr = metrics.mr,
                    "Experiment completed"
                );
            }
            None => {
                self.deps.store.update_status(id, resolution.status).await?;
                if let Some(reason) = &resolution.failure {
                    warn!(experiment_id = %id, reason = %reason, "Experiment failed");
                }
            }
        }

        Ok(resolution.status)
    }
}
