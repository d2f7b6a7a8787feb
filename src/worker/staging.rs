//! Local staging area shared with the evaluator.
//!
//! Files are namespaced by experiment id: `{id}.json` is the staged input,
//! `{id}.out` is the evaluator's result.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{OutputError, StorageError};
use crate::experiment::output::parse_metrics;
use crate::experiment::{ExperimentId, Metrics};

#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the staging directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::Staging {
                path: self.dir.clone(),
                source,
            })
    }

    pub fn input_path(&self, id: &ExperimentId) -> PathBuf {
        self.dir.join(id.input_file_name())
    }

    pub fn output_path(&self, id: &ExperimentId) -> PathBuf {
        self.dir.join(id.output_file_name())
    }

    /// Write the fetched input artifact to `{id}.json`.
    pub async fn write_input(
        &self,
        id: &ExperimentId,
        content: &str,
    ) -> Result<PathBuf, StorageError> {
        let path = self.input_path(id);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| StorageError::Staging {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Remove a leftover `{id}.out` from an earlier run.
    pub async fn clear_output(&self, id: &ExperimentId) -> Result<(), StorageError> {
        let path = self.output_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Staging { path, source }),
        }
    }

    /// Read and parse `{id}.out`.
    pub async fn read_metrics(&self, id: &ExperimentId) -> Result<Metrics, OutputError> {
        let path = self.output_path(id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OutputError::Missing { path });
            }
            Err(e) => {
                return Err(OutputError::Unreadable {
                    path,
                    reason: e.to_string(),
                });
            }
        };
        parse_metrics(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paths_are_namespaced_by_id() {
        let staging = Staging::new("/srv/experiments");
        let id = ExperimentId::from("abc");
        assert_eq!(staging.input_path(&id), PathBuf::from("/srv/experiments/abc.json"));
        assert_eq!(staging.output_path(&id), PathBuf::from("/srv/experiments/abc.out"));
    }

    #[tokio::test]
    async fn write_input_and_read_metrics() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::new(tmp.path().join("nested"));
        staging.ensure_dir().await.unwrap();
        let id = ExperimentId::from("abc");

        let path = staging.write_input(&id, "{\"k\": 1}").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"k\": 1}");

        std::fs::write(staging.output_path(&id), "0.42,0.87,0.65\n").unwrap();
        let metrics = staging.read_metrics(&id).await.unwrap();
        assert_eq!(metrics, Metrics::new(0.42, 0.87, 0.65));
    }

    #[tokio::test]
    async fn missing_output() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::new(tmp.path());
        let err = staging.read_metrics(&ExperimentId::from("nope")).await.unwrap_err();
        assert!(matches!(err, OutputError::Missing { .. }));
    }

    #[tokio::test]
    async fn malformed_output() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::new(tmp.path());
        let id = ExperimentId::from("abc");
        std::fs::write(staging.output_path(&id), "0.42,0.87").unwrap();
        let err = staging.read_metrics(&id).await.unwrap_err();
        assert!(matches!(err, OutputError::FieldCount { found: 2 }));
    }

    #[tokio::test]
    async fn clear_output_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::new(tmp.path());
        let id = ExperimentId::from("abc");
        std::fs::write(staging.output_path(&id), "1,2,3").unwrap();

        staging.clear_output(&id).await.unwrap();
        assert!(!staging.output_path(&id).exists());
        staging.clear_output(&id).await.unwrap();
    }

    #[tokio::test]
    async fn write_into_missing_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = Staging::new(tmp.path().join("does-not-exist"));
        let err = staging
            .write_input(&ExperimentId::from("abc"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Staging { .. }));
    }
}
