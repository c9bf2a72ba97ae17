//! SQLite implementation of the `jobqueue-core` `JobStore` and
//! `StoreSessionFactory` traits.
//!
//! # Concurrency model
//!
//! SQLite has no `SELECT ... FOR UPDATE`. Instead, claim-like operations
//! (`claim_next`, `sweep_timeouts`, `cleanup`) open an immediate write
//! transaction (`BEGIN IMMEDIATE`) on a single checked-out connection, scan
//! candidates in application code, and apply conditional `UPDATE ... WHERE
//! id = ? AND status = ?` statements whose `rows_affected()` is checked.
//! Because SQLite serializes all writer transactions against a single
//! database file, only one worker's `BEGIN IMMEDIATE` can hold the write
//! lock at a time — this is what gives `claim_next` its at-most-one-winner
//! guarantee even though the lock is file-level rather than row-level.
//!
//! The pool is configured with WAL journaling (readers don't block the
//! writer) and a short busy-timeout; `BEGIN IMMEDIATE` itself is retried
//! with capped backoff on `SQLITE_BUSY`, mirroring the corpus's own
//! `sqlite_claim_stress` test harness.

mod rows;
mod schema;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobqueue_core::{
    ClaimedJob, Job, JobExecution, JobQueueError, JobStatus, JobStore, JobSummary, ListFilter,
    QueueStats, Result, StoreSessionFactory,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use rows::{JobExecutionRow, JobRow};

const MAX_BEGIN_RETRIES: u32 = 10;

fn map_sqlx_error(err: sqlx::Error) -> JobQueueError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if code.as_ref() == "5" || code.as_ref() == "6" {
                return JobQueueError::StoreError(format!(
                    "database busy/locked: {}",
                    db_err.message()
                ));
            }
        }
    }
    JobQueueError::StoreError(err.to_string())
}

fn is_busy(err: &sqlx::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

/// Opens/reuses a `sqlx::SqlitePool` and applies the `jobs`/`job_executions`
/// schema. The only `StoreSessionFactory` implementation in this workspace.
pub struct SqliteSessionFactory {
    pool: SqlitePool,
}

impl SqliteSessionFactory {
    /// Opens (creating if missing) the database at `path`, with WAL
    /// journaling and a short busy-timeout, per the corpus's own stress
    /// test configuration.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(map_sqlx_error)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(250))
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self { pool })
    }

    /// Wraps an already-open pool (e.g. `sqlite::memory:` for tests).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[async_trait]
impl StoreSessionFactory for SqliteSessionFactory {
    async fn apply_schema(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLite-backed [`JobStore`].
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn from_factory(factory: &SqliteSessionFactory) -> Self {
        Self::new(factory.pool())
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn begin_immediate(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        let mut attempt = 0u32;
        loop {
            let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
            match sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await {
                Ok(_) => return Ok(conn),
                Err(err) if is_busy(&err) && attempt < MAX_BEGIN_RETRIES => {
                    attempt += 1;
                    let backoff_ms = (1u64 << attempt.min(6)).min(50);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn apply_schema(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn insert_job(&self, job: Job) -> Result<()> {
        let parameters = serde_json::to_string(&job.parameters)?;
        let dependencies = serde_json::to_string(&job.dependencies)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, function_identifier, parameters, priority, dependencies,
                max_attempts, attempts, timeout_seconds, status,
                created_at, updated_at, started_at, completed_at,
                worker_id, result, error, executing_workflow_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(&job.function_identifier)
        .bind(parameters)
        .bind(job.priority)
        .bind(dependencies)
        .bind(job.max_attempts)
        .bind(job.attempts)
        .bind(job.timeout_seconds)
        .bind(job.status.to_string())
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.worker_id)
        .bind(job.result.as_ref().map(|r| r.to_string()))
        .bind(&job.error)
        .bind(&job.executing_workflow_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'failed')",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn requeue(&self, job_id: &str) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending', attempts = 0, worker_id = NULL, \
             error = NULL, result = NULL, started_at = NULL, completed_at = NULL, \
             updated_at = ? \
             WHERE id = ? AND status IN ('failed', 'cancelled', 'timeout')",
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_job(),
            None => Err(JobQueueError::NotFound(format!("job {job_id}"))),
        }
    }

    async fn list_executions(&self, job_id: &str) -> Result<Vec<JobExecution>> {
        let rows: Vec<JobExecutionRow> = sqlx::query_as(
            "SELECT * FROM job_executions WHERE job_id = ? ORDER BY started_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_execution()).collect()
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<JobSummary>> {
        let limit = filter.limit.unwrap_or(100);

        let rows: Vec<JobRow> = match (&filter.status, &filter.workflow_id) {
            (Some(status), Some(workflow_id)) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE status = ? AND executing_workflow_id = ? \
                     ORDER BY created_at DESC LIMIT ?",
                )
                .bind(status.to_string())
                .bind(workflow_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            (Some(status), None) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC LIMIT ?",
                )
                .bind(status.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            (None, Some(workflow_id)) => {
                sqlx::query_as(
                    "SELECT * FROM jobs WHERE executing_workflow_id = ? \
                     ORDER BY created_at DESC LIMIT ?",
                )
                .bind(workflow_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            (None, None) => {
                sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| row.into_job().map(|job| JobSummary::from(&job)))
            .collect()
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.begin_immediate().await?;

        sqlx::query(
            "DELETE FROM job_executions WHERE job_id IN ( \
                 SELECT id FROM jobs \
                 WHERE status IN ('completed', 'failed', 'cancelled', 'timeout') \
                   AND completed_at < ? \
             )",
        )
        .bind(older_than)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let deleted = sqlx::query(
            "DELETE FROM jobs \
             WHERE status IN ('completed', 'failed', 'cancelled', 'timeout') \
               AND completed_at < ?",
        )
        .bind(older_than)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok(deleted)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs WHERE status = 'pending') AS pending,
                (SELECT COUNT(*) FROM jobs WHERE status = 'running') AS running,
                (SELECT COUNT(*) FROM jobs WHERE status = 'completed') AS completed,
                (SELECT COUNT(*) FROM jobs WHERE status = 'failed') AS failed,
                (SELECT COUNT(*) FROM jobs WHERE status = 'cancelled') AS cancelled,
                (SELECT COUNT(*) FROM jobs WHERE status = 'timeout') AS timeout
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            running: row.get("running"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            cancelled: row.get("cancelled"),
            timeout: row.get("timeout"),
        })
    }

    async fn sweep_timeouts(&self) -> Result<u64> {
        let mut conn = self.begin_immediate().await?;

        let overdue: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs \
             WHERE status = 'running' \
               AND datetime(started_at, '+' || timeout_seconds || ' seconds') < datetime('now')",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let mut swept = 0u64;
        let now = Utc::now();

        for row in &overdue {
            let job_id = &row.id;
            let new_attempts = row.attempts + 1;
            let max_attempts = row.max_attempts;
            let timeout_seconds = row.timeout_seconds;

            sqlx::query(
                "UPDATE job_executions SET status = 'timeout', completed_at = ?, error = ? \
                 WHERE job_id = ? AND status = 'running'",
            )
            .bind(now)
            .bind(format!("timed out after {timeout_seconds} seconds"))
            .bind(job_id)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

            if new_attempts < max_attempts {
                sqlx::query(
                    "UPDATE jobs SET attempts = ?, status = 'pending', worker_id = NULL, \
                     started_at = NULL, updated_at = ? WHERE id = ?",
                )
                .bind(new_attempts)
                .bind(now)
                .bind(job_id)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            } else {
                sqlx::query(
                    "UPDATE jobs SET attempts = ?, status = 'timeout', completed_at = ?, \
                     error = ?, updated_at = ? WHERE id = ?",
                )
                .bind(new_attempts)
                .bind(now)
                .bind(format!("timed out after {timeout_seconds} seconds"))
                .bind(now)
                .bind(job_id)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            }

            swept += 1;
        }

        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok(swept)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<ClaimedJob>> {
        let mut conn = self.begin_immediate().await?;

        let candidates: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE status = 'pending' \
             ORDER BY priority DESC, created_at ASC, id ASC",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let mut claimed = None;

        for row in candidates {
            let job_id = row.id.clone();
            let dependencies: Vec<String> = serde_json::from_str(&row.dependencies)?;

            match self.check_dependencies(&mut *conn, &dependencies).await? {
                DependencyGate::Ready => {
                    let now = Utc::now();
                    let updated = sqlx::query(
                        "UPDATE jobs SET status = 'running', worker_id = ?, started_at = ?, \
                         attempts = attempts + 1, updated_at = ? \
                         WHERE id = ? AND status = 'pending'",
                    )
                    .bind(worker_id)
                    .bind(now)
                    .bind(now)
                    .bind(&job_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;

                    if updated.rows_affected() == 1 {
                        let execution_id = Uuid::new_v4().to_string();
                        sqlx::query(
                            "INSERT INTO job_executions (id, job_id, worker_id, started_at, status) \
                             VALUES (?, ?, ?, ?, 'running')",
                        )
                        .bind(&execution_id)
                        .bind(&job_id)
                        .bind(worker_id)
                        .bind(now)
                        .execute(&mut *conn)
                        .await
                        .map_err(map_sqlx_error)?;

                        let mut job = row.into_job()?;
                        job.status = JobStatus::Running;
                        job.worker_id = Some(worker_id.to_string());
                        job.started_at = Some(now);
                        job.attempts += 1;
                        job.updated_at = now;

                        claimed = Some(ClaimedJob { job, execution_id });
                        break;
                    }
                }
                DependencyGate::Blocked => continue,
                DependencyGate::Cancel(reason) => {
                    let now = Utc::now();
                    sqlx::query(
                        "UPDATE jobs SET status = 'cancelled', error = ?, completed_at = ?, \
                         updated_at = ? WHERE id = ? AND status = 'pending'",
                    )
                    .bind(reason)
                    .bind(now)
                    .bind(now)
                    .bind(&job_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;
                }
            }
        }

        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok(claimed)
    }

    async fn finalize_success(
        &self,
        job_id: &str,
        worker_id: &str,
        execution_id: &str,
        result: serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now();
        let result_text = result.to_string();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let updated = sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = ?, result = ?, updated_at = ? \
             WHERE id = ? AND worker_id = ? AND status = 'running'",
        )
        .bind(now)
        .bind(&result_text)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE job_executions SET status = 'completed', completed_at = ?, result = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(now)
        .bind(&result_text)
        .bind(execution_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            tracing::info!(
                job_id,
                worker_id,
                "finalize_success matched no row; job was reassigned by the timeout sweep"
            );
        }

        Ok(())
    }

    async fn finalize_failure(
        &self,
        job_id: &str,
        worker_id: &str,
        execution_id: &str,
        error: String,
    ) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let current: Option<(i64, i64)> =
            sqlx::query_as("SELECT attempts, max_attempts FROM jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let Some((attempts, max_attempts)) = current else {
            return Err(JobQueueError::NotFound(format!("job {job_id}")));
        };

        let updated = if attempts < max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = 'pending', worker_id = NULL, started_at = NULL, \
                 error = ?, updated_at = ? \
                 WHERE id = ? AND worker_id = ? AND status = 'running'",
            )
            .bind(&error)
            .bind(now)
            .bind(job_id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
        } else {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', completed_at = ?, error = ?, updated_at = ? \
                 WHERE id = ? AND worker_id = ? AND status = 'running'",
            )
            .bind(now)
            .bind(&error)
            .bind(now)
            .bind(job_id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
        };

        sqlx::query(
            "UPDATE job_executions SET status = 'failed', completed_at = ?, error = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(now)
        .bind(&error)
        .bind(execution_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            tracing::info!(
                job_id,
                worker_id,
                "finalize_failure matched no row; job was reassigned by the timeout sweep"
            );
        }

        Ok(())
    }
}

enum DependencyGate {
    Ready,
    Blocked,
    Cancel(String),
}

impl SqliteJobStore {
    async fn check_dependencies(
        &self,
        conn: &mut sqlx::SqliteConnection,
        dependencies: &[String],
    ) -> Result<DependencyGate> {
        for dep_id in dependencies {
            let dep_status: Option<String> =
                sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
                    .bind(dep_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;

            match dep_status.as_deref() {
                Some("completed") => continue,
                Some("pending") | Some("running") => return Ok(DependencyGate::Blocked),
                Some(other) => {
                    return Ok(DependencyGate::Cancel(format!(
                        "dependency {dep_id} ended in status {other}"
                    )))
                }
                // A dependency that doesn't exist yet (or ever) keeps the
                // job pending forever, per spec.md §4.1's submit contract.
                None => return Ok(DependencyGate::Blocked),
            }
        }
        Ok(DependencyGate::Ready)
    }
}
