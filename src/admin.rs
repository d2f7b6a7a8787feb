//! Operator commands: bulk resets, visibility, manual submission, listing.
//!
//! Bulk resets follow the administrative edges of the state machine
//! (`FAILED → PENDING`, `COMPLETED → REPROCESS`) and may run while a worker
//! is active; the worker picks up the reset rows on a later iteration.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::experiment::split::normalize_label;
use crate::experiment::state::transition;
use crate::experiment::{Dataset, Experiment, ExperimentStatus};
use crate::store::ExperimentStore;

/// Re-queue every failed experiment. Returns the number of rows reset.
pub async fn requeue_failed(store: &dyn ExperimentStore) -> Result<usize> {
    bulk_reset(store, ExperimentStatus::Failed, ExperimentStatus::Pending).await
}

/// Force re-evaluation of every completed experiment.
pub async fn reprocess_completed(store: &dyn ExperimentStore) -> Result<usize> {
    bulk_reset(store, ExperimentStatus::Completed, ExperimentStatus::Reprocess).await
}

async fn bulk_reset(
    store: &dyn ExperimentStore,
    from: ExperimentStatus,
    to: ExperimentStatus,
) -> Result<usize> {
    transition(from, to)?;
    let changed = store.bulk_update_status(from, to).await?;
    info!(from = %from, to = %to, count = changed, "Bulk status reset");
    Ok(changed)
}

/// Make every experiment owned by `user_id` public.
pub async fn publish_user_experiments(store: &dyn ExperimentStore, user_id: &str) -> Result<usize> {
    let changed = store.set_public_for_user(user_id, true).await?;
    info!(user_id, count = changed, "Experiments published");
    Ok(changed)
}

/// A submission entered by an operator.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: String,
    pub name: String,
    pub dataset: String,
    pub split: String,
    pub match_file_url: String,
}

/// Insert a `PENDING` experiment with zeroed metrics.
///
/// The split label is normalized (components sorted) before storing.
pub async fn submit(store: &dyn ExperimentStore, submission: Submission) -> Result<Experiment> {
    let split = normalize_label(&submission.split).map_err(|e| {
        Error::Config(crate::error::ConfigError::InvalidValue {
            key: "split".into(),
            message: e.to_string(),
        })
    })?;

    if Dataset::from_label(&submission.dataset).is_none() {
        warn!(
            dataset = %submission.dataset,
            "Dataset has no directory mapping; the worker will fail this experiment"
        );
    }

    let experiment = Experiment::new(
        submission.user_id,
        submission.name,
        submission.dataset,
        split,
        submission.match_file_url,
    );
    store.insert_experiment(&experiment).await?;
    info!(experiment_id = %experiment.id, split = %experiment.split, "Experiment submitted");
    Ok(experiment)
}

/// Experiments newest first, optionally filtered by status.
pub async fn list(
    store: &dyn ExperimentStore,
    status: Option<ExperimentStatus>,
) -> Result<Vec<Experiment>> {
    Ok(store.list_experiments(status).await?)
}
