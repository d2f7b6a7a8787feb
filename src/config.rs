//! Configuration types, built from environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::eval::invocation::{EvaluatorConfig, Launcher};
use crate::worker::WorkerSettings;

const DEFAULT_DB_PATH: &str = "./data/bench-eval.db";
const DEFAULT_STORAGE_BASE_URL: &str = "https://upload.benchmark.eucadar.com";
const DEFAULT_IMAGE: &str = "eval_server";
const DEFAULT_MODULE: &str = "nonrigid_benchmark.evaluate";

/// Where experiments are stored.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    /// Remote libSQL server (Turso).
    Remote { url: String, auth_token: SecretString },
    /// Local database file.
    Local { path: PathBuf },
}

impl DatabaseConfig {
    /// `TURSO_DATABASE_URL` + `TURSO_AUTH_TOKEN` select the remote store;
    /// otherwise `BENCH_EVAL_DB_PATH` (default `./data/bench-eval.db`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty(&lookup, "TURSO_DATABASE_URL") {
            let token = non_empty(&lookup, "TURSO_AUTH_TOKEN")
                .ok_or_else(|| ConfigError::MissingEnvVar("TURSO_AUTH_TOKEN".into()))?;
            return Ok(Self::Remote {
                url,
                auth_token: SecretString::from(token),
            });
        }

        let path =
            non_empty(&lookup, "BENCH_EVAL_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into());
        Ok(Self::Local {
            path: PathBuf::from(path),
        })
    }
}

/// Object storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub fetch_timeout: Duration,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            base_url: non_empty(&lookup, "STORAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_STORAGE_BASE_URL.into()),
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "STORAGE_FETCH_TIMEOUT_SECS",
                120,
            )?),
        })
    }
}

/// Everything the evaluation worker needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub evaluator: EvaluatorConfig,
    pub settings: WorkerSettings,
}

impl WorkerConfig {
    /// `EXPERIMENT_DIR` and `DATASET_DIR` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let experiment_dir = required(&lookup, "EXPERIMENT_DIR")?;
        let dataset_root = required(&lookup, "DATASET_DIR")?;

        let nproc: u32 = parse_or(&lookup, "EVAL_NPROC", 10)?;
        if nproc == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EVAL_NPROC".into(),
                message: "must be at least 1".into(),
            });
        }

        let launcher = match non_empty(&lookup, "EVAL_LAUNCHER")
            .unwrap_or_else(|| "docker".into())
            .to_lowercase()
            .as_str()
        {
            "docker" => Launcher::Docker {
                image: non_empty(&lookup, "EVAL_IMAGE").unwrap_or_else(|| DEFAULT_IMAGE.into()),
                module: non_empty(&lookup, "EVAL_MODULE").unwrap_or_else(|| DEFAULT_MODULE.into()),
                dockerfile_dir: non_empty(&lookup, "EVAL_DOCKERFILE_DIR").map(PathBuf::from),
            },
            "local" => Launcher::Local {
                program: required(&lookup, "EVAL_PROGRAM")?,
                args: non_empty(&lookup, "EVAL_ARGS")
                    .map(|s| s.split_whitespace().map(String::from).collect())
                    .unwrap_or_default(),
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "EVAL_LAUNCHER".into(),
                    message: format!("expected \"docker\" or \"local\", got {other:?}"),
                });
            }
        };

        let settings = WorkerSettings {
            poll_interval: Duration::from_secs(parse_or(&lookup, "EVAL_POLL_INTERVAL_SECS", 10)?),
            output_settle: Duration::from_millis(parse_or(&lookup, "EVAL_OUTPUT_SETTLE_MS", 1000)?),
        };

        Ok(Self {
            evaluator: EvaluatorConfig {
                launcher,
                experiment_dir: PathBuf::from(experiment_dir),
                dataset_root: PathBuf::from(dataset_root),
                nproc,
            },
            settings,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}
