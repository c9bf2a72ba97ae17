//! Error taxonomy for the job queue core.

use thiserror::Error;

/// Errors the core distinguishes, per the queue's state-machine contract.
///
/// `StoreError` and `SerializationError` carry `#[from]` conversions so that
/// backend crates (e.g. `jobqueue-sqlite`) can propagate driver/serde errors
/// with plain `?`.
#[derive(Debug, Error)]
pub enum JobQueueError {
    /// Submission failed validation (`max_attempts < 1`, `timeout_seconds <= 0`, ...).
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// Lookup of an unknown job, execution, or workflow id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted state transition not permitted by the current status.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Parameters or result could not be encoded/decoded as JSON.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The resolver could not produce a callable for a function identifier.
    ///
    /// Counts as a regular job failure: the worker applies the same
    /// retry policy as a `JobExecutionFailure`.
    #[error("resolve failure: {0}")]
    ResolveFailure(String),

    /// User code raised while executing a claimed job.
    #[error("job execution failure: {0}")]
    JobExecutionFailure(String),

    /// The backing store raised an error.
    #[error("store error: {0}")]
    StoreError(String),

    /// A workflow's dependency graph is not a DAG.
    #[error("cycle detected among jobs: {0:?}")]
    CycleDetected(Vec<String>),

    /// A workflow job depends on a name not added to the same workflow.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),
}

pub type Result<T> = std::result::Result<T, JobQueueError>;
