//! The seam between the state-machine policy (`Queue`/`Worker`) and a
//! concrete embedded-store backend.
//!
//! `jobqueue-sqlite::SqliteJobStore` is the only production implementation,
//! but keeping this as a trait — rather than hard-wiring SQL calls into
//! `Queue`/`Worker` — mirrors the teacher's own `JobStore`/`PgJobStore`
//! split and keeps the invariants in spec.md testable against a narrow
//! surface.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ClaimedJob, Job, JobExecution, ListFilter, QueueStats};

/// Durable operations the job-queue state machine needs from its backing
/// store. Every method here maps onto one short, self-contained
/// transaction — none of them may span the execution of user job code.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Applies the `jobs`/`job_executions` schema and indexes if absent.
    async fn apply_schema(&self) -> Result<()>;

    /// Inserts one `jobs` row with status `pending`, `attempts = 0`.
    async fn insert_job(&self, job: Job) -> Result<()>;

    /// Transitions `pending`/`failed` -> `cancelled`. Returns whether a row changed.
    async fn cancel(&self, job_id: &str) -> Result<bool>;

    /// Transitions `failed`/`cancelled`/`timeout` -> `pending`, resetting attempt state.
    /// Returns whether a row changed.
    async fn requeue(&self, job_id: &str) -> Result<bool>;

    /// Fetches one job row, or `Err(NotFound)`.
    async fn get_job(&self, job_id: &str) -> Result<Job>;

    /// Fetches a job's executions ordered by `started_at` ascending.
    async fn list_executions(&self, job_id: &str) -> Result<Vec<JobExecution>>;

    /// Lists job summaries ordered by `created_at` descending.
    async fn list(&self, filter: ListFilter) -> Result<Vec<crate::model::JobSummary>>;

    /// Deletes terminal jobs (and their executions) completed before the cutoff.
    async fn cleanup(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64>;

    /// Read-only status counts, for operational visibility.
    async fn stats(&self) -> Result<QueueStats>;

    /// Sweep: promote expired `running` rows back to `pending`, or to the
    /// terminal `timeout` status if attempts are exhausted. Returns the
    /// number of rows swept.
    async fn sweep_timeouts(&self) -> Result<u64>;

    /// Select and atomically claim one eligible `pending` job for `worker_id`,
    /// honoring the dependency gate (cancelling any job whose dependency is
    /// terminally non-completed along the way) and the
    /// `priority DESC, created_at ASC, id ASC` tie-break.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<ClaimedJob>>;

    /// Finalize a successful attempt. A no-op (returns `Ok(())`) if the job
    /// was reassigned by the sweep in the meantime (conditional update
    /// matched zero rows) — the execution row is still written for audit.
    async fn finalize_success(
        &self,
        job_id: &str,
        worker_id: &str,
        execution_id: &str,
        result: serde_json::Value,
    ) -> Result<()>;

    /// Finalize a failed attempt; retries if `attempts < max_attempts`, else terminal `failed`.
    async fn finalize_failure(
        &self,
        job_id: &str,
        worker_id: &str,
        execution_id: &str,
        error: String,
    ) -> Result<()>;
}
