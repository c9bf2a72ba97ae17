//! Row <-> domain-model conversions.

use chrono::{DateTime, Utc};
use jobqueue_core::{ExecutionStatus, Job, JobExecution, JobQueueError, JobStatus};
use std::str::FromStr;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: String,
    pub name: String,
    pub function_identifier: String,
    pub parameters: String,
    pub priority: i64,
    pub dependencies: String,
    pub max_attempts: i64,
    pub attempts: i64,
    pub timeout_seconds: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub executing_workflow_id: Option<String>,
}

impl JobRow {
    pub fn into_job(self) -> Result<Job, JobQueueError> {
        Ok(Job {
            id: self.id,
            name: self.name,
            function_identifier: self.function_identifier,
            parameters: serde_json::from_str(&self.parameters)?,
            priority: self.priority,
            dependencies: serde_json::from_str(&self.dependencies)?,
            max_attempts: self.max_attempts as i32,
            attempts: self.attempts as i32,
            timeout_seconds: self.timeout_seconds,
            status: JobStatus::from_str(&self.status)
                .map_err(JobQueueError::StoreError)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            worker_id: self.worker_id,
            result: self
                .result
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            error: self.error,
            executing_workflow_id: self.executing_workflow_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobExecutionRow {
    pub id: String,
    pub job_id: String,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl JobExecutionRow {
    pub fn into_execution(self) -> Result<JobExecution, JobQueueError> {
        Ok(JobExecution {
            id: self.id,
            job_id: self.job_id,
            worker_id: self.worker_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            status: ExecutionStatus::from_str(&self.status).map_err(JobQueueError::StoreError)?,
            result: self
                .result
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            error: self.error,
        })
    }
}
