//! Evaluation worker.
//!
//! - `staging`: `{id}.json` / `{id}.out` files shared with the evaluator
//! - `evaluation`: the single-in-flight polling loop

pub mod evaluation;
pub mod staging;

pub use evaluation::{EvaluationWorker, Iteration, WorkerDeps, WorkerSettings};
pub use staging::Staging;
