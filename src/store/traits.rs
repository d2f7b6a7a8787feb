//! `ExperimentStore` trait: the persistence interface the worker and the
//! admin commands consume.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::experiment::{Experiment, ExperimentId, ExperimentStatus, Metrics};

/// Backend-agnostic experiment store.
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a new experiment.
    async fn insert_experiment(&self, experiment: &Experiment) -> Result<(), DatabaseError>;

    /// Get an experiment by ID.
    async fn get_experiment(&self, id: &ExperimentId)
    -> Result<Option<Experiment>, DatabaseError>;

    /// Experiments whose status is in `statuses`, oldest `created_at` first,
    /// at most `limit` rows.
    async fn find_claimable(
        &self,
        statuses: &[ExperimentStatus],
        limit: usize,
    ) -> Result<Vec<Experiment>, DatabaseError>;

    /// Set an experiment's status, leaving metrics untouched.
    ///
    /// Returns `NotFound` if no row has this id.
    async fn update_status(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
    ) -> Result<(), DatabaseError>;

    /// Mark an experiment `COMPLETED` and write its metrics in one statement.
    async fn complete_experiment(
        &self,
        id: &ExperimentId,
        metrics: Metrics,
    ) -> Result<(), DatabaseError>;

    /// Move every experiment in `from` to `to`. Returns the number of rows changed.
    async fn bulk_update_status(
        &self,
        from: ExperimentStatus,
        to: ExperimentStatus,
    ) -> Result<usize, DatabaseError>;

    /// Set the visibility flag on every experiment owned by `user_id`.
    /// Returns the number of rows changed.
    async fn set_public_for_user(&self, user_id: &str, public: bool)
    -> Result<usize, DatabaseError>;

    /// List experiments, newest first, optionally filtered by status.
    async fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> Result<Vec<Experiment>, DatabaseError>;

    /// Count experiments in a status.
    async fn count_by_status(&self, status: ExperimentStatus) -> Result<usize, DatabaseError>;
}
