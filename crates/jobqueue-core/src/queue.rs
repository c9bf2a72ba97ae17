//! Submission, cancellation, requeue, status query, listing, and cleanup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{JobQueueError, Result};
use crate::model::{Job, JobDefinition, JobStatus, ListFilter, QueueStats, StatusRecord};
use crate::store::JobStore;

/// Owns schema creation (via the store) and exposes the job submission
/// surface. Cheap to clone: holds only an `Arc<dyn JobStore>`.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn JobStore>,
}

impl Queue {
    /// Wraps an already-constructed store. Applies the schema before
    /// returning so callers never race the first submission against
    /// table creation.
    pub async fn new(store: Arc<dyn JobStore>) -> Result<Self> {
        store.apply_schema().await?;
        Ok(Self { store })
    }

    pub(crate) fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Inserts a job as `pending` with a fresh id. Fails with `InvalidJob`
    /// if `max_attempts < 1` or `timeout_seconds <= 0`.
    ///
    /// Submission does not verify that dependency ids exist: a reference to
    /// a nonexistent dependency leaves the job `pending` forever, per
    /// spec.md §4.1's contract.
    pub async fn submit(&self, def: JobDefinition, workflow_id: Option<&str>) -> Result<String> {
        if def.max_attempts < 1 {
            return Err(JobQueueError::InvalidJob(
                "max_attempts must be >= 1".into(),
            ));
        }
        if def.timeout_seconds <= 0 {
            return Err(JobQueueError::InvalidJob(
                "timeout_seconds must be > 0".into(),
            ));
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: def.name,
            function_identifier: def.function_identifier,
            parameters: def.parameters,
            priority: def.priority,
            dependencies: def.dependencies,
            max_attempts: def.max_attempts,
            attempts: 0,
            timeout_seconds: def.timeout_seconds,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            worker_id: None,
            result: None,
            error: None,
            executing_workflow_id: workflow_id.map(|s| s.to_string()),
        };

        let id = job.id.clone();
        tracing::debug!(job_id = %id, name = %job.name, "submitting job");
        self.store.insert_job(job).await?;
        Ok(id)
    }

    /// Only succeeds when current status is `pending` or `failed`.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        self.store.cancel(job_id).await
    }

    /// Only succeeds when current status is `failed`, `cancelled`, or `timeout`.
    pub async fn requeue(&self, job_id: &str) -> Result<bool> {
        self.store.requeue(job_id).await
    }

    /// The job row plus its executions ordered by `started_at` ascending.
    pub async fn get_status(&self, job_id: &str) -> Result<StatusRecord> {
        let job = self.store.get_job(job_id).await?;
        let executions = self.store.list_executions(job_id).await?;
        Ok(StatusRecord { job, executions })
    }

    /// Filters by status and/or workflow id, ordered by `created_at` descending.
    pub async fn list(&self, filter: ListFilter) -> Result<Vec<crate::model::JobSummary>> {
        self.store.list(filter).await
    }

    /// Deletes terminal jobs (and their executions) whose `completed_at` is
    /// older than `older_than_days` days.
    pub async fn cleanup(&self, older_than_days: i64) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::days(older_than_days);
        self.store.cleanup(cutoff).await
    }

    /// Read-only status counts.
    pub async fn stats(&self) -> Result<QueueStats> {
        self.store.stats().await
    }
}
