//! Experiment data model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::experiment::state::{ExperimentStatus, Metrics};

/// Opaque experiment identifier.
///
/// Stored as text; ids created here are UUIDs but rows written by other
/// tools may carry any unique string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(String);

impl ExperimentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the input artifact is staged under.
    pub fn input_file_name(&self) -> String {
        format!("{}.json", self.0)
    }

    /// File name the evaluator writes its result to.
    pub fn output_file_name(&self) -> String {
        format!("{}.out", self.0)
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ExperimentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExperimentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One benchmark submission for one split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    /// Submission identifier shown on the leaderboard.
    pub name: String,
    /// Dataset group label, e.g. "Single Object".
    pub dataset: String,
    /// Split label, e.g. "deformation_1-illumination-viewpoint".
    pub split: String,
    /// Storage key or URL of the matches file.
    pub match_file_url: String,
    pub status: ExperimentStatus,
    /// Zero until the experiment completes.
    #[serde(flatten)]
    pub metrics: Metrics,
    pub public: bool,
    /// Owner.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// A fresh `PENDING`, private submission with zeroed metrics.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        dataset: impl Into<String>,
        split: impl Into<String>,
        match_file_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExperimentId::new(),
            name: name.into(),
            dataset: dataset.into(),
            split: split.into(),
            match_file_url: match_file_url.into(),
            status: ExperimentStatus::Pending,
            metrics: Metrics::default(),
            public: false,
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set the creation time (claim order).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// Builder: set the status.
    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set the id.
    pub fn with_id(mut self, id: impl Into<ExperimentId>) -> Self {
        self.id = id.into();
        self
    }
}
