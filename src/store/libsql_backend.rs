//! libSQL backend: async `ExperimentStore` implementation.
//!
//! Supports a remote libSQL server (Turso), a local database file, and an
//! in-memory database for tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::experiment::{Experiment, ExperimentId, ExperimentStatus, Metrics};
use crate::store::migrations;
use crate::store::traits::ExperimentStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Connect to a remote libSQL server and run migrations.
    pub async fn new_remote(url: &str, auth_token: &SecretString) -> Result<Self, DatabaseError> {
        let token = auth_token.expose_secret().to_string();
        let db = libsql::Builder::new_remote(url.to_string(), token)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to {url}: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url = %url, "Remote database connected");
        Ok(backend)
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format: fixed-width microseconds so text order is time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to an Experiment.
///
/// Column order matches EXPERIMENT_COLUMNS.
fn row_to_experiment(row: &libsql::Row) -> Result<Experiment, DatabaseError> {
    let id: String = row.get(0)?;
    let status_str: String = row.get(5)?;
    let status = status_str
        .parse::<ExperimentStatus>()
        .map_err(|e| DatabaseError::Serialization(format!("experiment {id}: {e}")))?;
    let public: i64 = row.get(9)?;
    let created_str: String = row.get(11)?;
    let updated_str: String = row.get(12)?;

    Ok(Experiment {
        id: ExperimentId::from(id),
        name: row.get(1)?,
        dataset: row.get(2)?,
        split: row.get(3)?,
        match_file_url: row.get(4)?,
        status,
        metrics: Metrics::new(row.get(6)?, row.get(7)?, row.get(8)?),
        public: public != 0,
        user_id: row.get(10)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

async fn collect_experiments(mut rows: libsql::Rows) -> Result<Vec<Experiment>, DatabaseError> {
    let mut experiments = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("read experiment row: {e}")))?
    {
        experiments.push(row_to_experiment(&row)?);
    }
    Ok(experiments)
}

// ── Trait implementation ────────────────────────────────────────────

const EXPERIMENT_COLUMNS: &str = concat!(
    "id, name, dataset, split, match_file_url, status, ",
    "ms, ma, mr, public, user_id, created_at, updated_at"
);

#[async_trait]
impl ExperimentStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_experiment(&self, experiment: &Experiment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO experiments ({EXPERIMENT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    experiment.id.as_str(),
                    experiment.name.as_str(),
                    experiment.dataset.as_str(),
                    experiment.split.as_str(),
                    experiment.match_file_url.as_str(),
                    experiment.status.as_str(),
                    experiment.metrics.ms,
                    experiment.metrics.ma,
                    experiment.metrics.mr,
                    experiment.public as i64,
                    experiment.user_id.as_str(),
                    format_datetime(&experiment.created_at),
                    format_datetime(&experiment.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_experiment: {e}")))?;
        debug!(id = %experiment.id, "Experiment inserted");
        Ok(())
    }

    async fn get_experiment(
        &self,
        id: &ExperimentId,
    ) -> Result<Option<Experiment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE id = ?1"),
                params![id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_experiment: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_experiment(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_experiment row: {e}"))),
        }
    }

    async fn find_claimable(
        &self,
        statuses: &[ExperimentStatus],
        limit: usize,
    ) -> Result<Vec<Experiment>, DatabaseError> {
        if statuses.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let limit_param = statuses.len() + 1;

        let mut args: Vec<libsql::Value> = statuses
            .iter()
            .map(|s| libsql::Value::Text(s.as_str().to_string()))
            .collect();
        args.push(libsql::Value::Integer(limit as i64));

        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EXPERIMENT_COLUMNS} FROM experiments
                     WHERE status IN ({placeholders})
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?{limit_param}"
                ),
                args,
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_claimable: {e}")))?;

        collect_experiments(rows).await
    }

    async fn update_status(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE experiments SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), format_datetime(&Utc::now()), id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_status: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "experiment".into(),
                id: id.to_string(),
            });
        }
        debug!(id = %id, status = %status, "Experiment status updated");
        Ok(())
    }

    async fn complete_experiment(
        &self,
        id: &ExperimentId,
        metrics: Metrics,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE experiments SET status = ?1, ms = ?2, ma = ?3, mr = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    ExperimentStatus::Completed.as_str(),
                    metrics.ms,
                    metrics.ma,
                    metrics.mr,
                    format_datetime(&Utc::now()),
                    id.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_experiment: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "experiment".into(),
                id: id.to_string(),
            });
        }
        debug!(id = %id, "Experiment completed");
        Ok(())
    }

    async fn bulk_update_status(
        &self,
        from: ExperimentStatus,
        to: ExperimentStatus,
    ) -> Result<usize, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE experiments SET status = ?1, updated_at = ?2 WHERE status = ?3",
                params![to.as_str(), format_datetime(&Utc::now()), from.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("bulk_update_status: {e}")))?;
        Ok(changed as usize)
    }

    async fn set_public_for_user(
        &self,
        user_id: &str,
        public: bool,
    ) -> Result<usize, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE experiments SET public = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![public as i64, format_datetime(&Utc::now()), user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_public_for_user: {e}")))?;
        Ok(changed as usize)
    }

    async fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> Result<Vec<Experiment>, DatabaseError> {
        let rows = match status {
            Some(status) => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE status = ?1 ORDER BY created_at DESC"
                        ),
                        params![status.as_str()],
                    )
                    .await
            }
            None => {
                self.conn()
                    .query(
                        &format!(
                            "SELECT {EXPERIMENT_COLUMNS} FROM experiments ORDER BY created_at DESC"
                        ),
                        (),
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("list_experiments: {e}")))?;

        collect_experiments(rows).await
    }

    async fn count_by_status(&self, status: ExperimentStatus) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM experiments WHERE status = ?1",
                params![status.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_by_status: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0)?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_by_status row: {e}"))),
        }
    }
}
