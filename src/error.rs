//! Error types for bench-eval.

use std::path::PathBuf;

use crate::experiment::state::TransitionError;

/// Top-level error type for the worker and admin commands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("State error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<libsql::Error> for DatabaseError {
    fn from(e: libsql::Error) -> Self {
        DatabaseError::Query(e.to_string())
    }
}

/// Object storage and staging errors (input artifact transfer).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Cannot resolve storage key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to stage {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Evaluator process errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Failed to launch {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("Failed waiting for evaluator: {0}")]
    WaitFailed(String),

    #[error("Evaluator image {image} unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },
}

/// Output artifact contract violations.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Output file {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("Output file {} unreadable: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("Field {field:?} is not a finite number")]
    NotNumeric { field: String },
}

/// Worker bookkeeping errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Experiment {id} is still in flight, refusing to claim another")]
    AlreadyInFlight { id: String },
}

/// Result type alias for bench-eval.
pub type Result<T> = std::result::Result<T, Error>;
