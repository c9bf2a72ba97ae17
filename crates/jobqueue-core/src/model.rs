//! Persisted and in-memory shapes for jobs, executions, and their status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;

/// Status of a persisted [`Job`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    /// A terminal status is never again mutated except by an explicit requeue.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "timeout" => Ok(JobStatus::Timeout),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Status of a single [`JobExecution`] (one attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "timeout" => Ok(ExecutionStatus::Timeout),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted unit of work: function identifier, parameters, and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub function_identifier: String,
    pub parameters: Json,
    pub priority: i64,
    pub dependencies: Vec<String>,
    pub max_attempts: i32,
    pub attempts: i32,
    pub timeout_seconds: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub result: Option<Json>,
    pub error: Option<String>,
    pub executing_workflow_id: Option<String>,
}

/// One attempt at running a [`Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: String,
    pub job_id: String,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub result: Option<Json>,
    pub error: Option<String>,
}

/// In-memory description of work, supplied by a submitter before a `Job`
/// row exists. `dependencies` names other jobs by their already-assigned
/// ids (for direct `Queue::submit` use); a [`crate::workflow::Workflow`]
/// rewrites its own in-memory dependency names into ids before submission.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub name: String,
    pub function_identifier: String,
    pub parameters: Json,
    pub priority: i64,
    pub dependencies: Vec<String>,
    pub max_attempts: i32,
    pub timeout_seconds: i64,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, function_identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function_identifier: function_identifier.into(),
            parameters: Json::Object(Default::default()),
            priority: 0,
            dependencies: Vec::new(),
            max_attempts: 3,
            timeout_seconds: 300,
        }
    }

    pub fn with_parameters(mut self, parameters: Json) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: i64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn depends_on(mut self, job_ids: impl IntoIterator<Item = String>) -> Self {
        self.dependencies.extend(job_ids);
        self
    }
}

/// A job row plus its executions, ordered by `started_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub job: Job,
    pub executions: Vec<JobExecution>,
}

/// Lightweight projection of a `Job` row for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub priority: i64,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub executing_workflow_id: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        JobSummary {
            id: job.id.clone(),
            name: job.name.clone(),
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            created_at: job.created_at,
            executing_workflow_id: job.executing_workflow_id.clone(),
        }
    }
}

/// Filter applied by [`crate::queue::Queue::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<JobStatus>,
    pub workflow_id: Option<String>,
    pub limit: Option<i64>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A job claimed for execution, paired with the `job_executions` row id the
/// claim transaction created for this attempt.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    pub execution_id: String,
}

/// Read-only queue health snapshot, grounded in the teacher's `QueueStats`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub timeout: i64,
}
