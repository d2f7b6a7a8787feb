//! bench-eval: evaluation worker for benchmark submissions.

pub mod admin;
pub mod config;
pub mod error;
pub mod eval;
pub mod experiment;
pub mod shutdown;
pub mod storage;
pub mod store;
pub mod worker;
