//! Experiments: the entity the evaluation worker drives.
//!
//! - `model`: `Experiment` record and its id
//! - `state`: lifecycle state machine and outcome resolution
//! - `dataset`: dataset label → directory mapping
//! - `split`: split label parsing and normalization
//! - `output`: evaluator output parsing

pub mod dataset;
pub mod model;
pub mod output;
pub mod split;
pub mod state;

pub use dataset::Dataset;
pub use model::{Experiment, ExperimentId};
pub use split::Split;
pub use state::{
    CLAIMABLE, EvaluationOutcome, ExperimentStatus, FailureReason, Metrics, Resolution, resolve,
};
