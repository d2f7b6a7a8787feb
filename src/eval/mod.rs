//! Evaluator invocation and process supervision.
//!
//! - `invocation`: evaluator command line (docker or local launcher)
//! - `runner`: spawn + wait with streamed stdout/stderr
//! - `image`: docker image presence check and build

pub mod image;
pub mod invocation;
pub mod runner;

pub use image::{ImageStatus, ensure_image};
pub use invocation::{EvaluatorConfig, Invocation, Launcher};
pub use runner::{ProcessRunner, RunningProcess, TokioProcessRunner};
