//! Claim-execute-finalize loop, plus the timeout sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{JobQueueError, Result};
use crate::resolver::{JobOutcome, Resolver};
use crate::store::JobStore;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A process/thread that claims and runs jobs. Identified by a textual
/// `worker_id` (default `host:pid`). Workers never share mutable in-memory
/// state with one another; all coordination goes through the store.
pub struct Worker {
    store: Arc<dyn JobStore>,
    resolver: Arc<dyn Resolver>,
    worker_id: String,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Worker {
    pub fn builder(store: Arc<dyn JobStore>, resolver: Arc<dyn Resolver>) -> WorkerBuilder {
        WorkerBuilder::new(store, resolver)
    }

    /// A cooperative handle that `stop()` can be called on independently of
    /// `start()`'s ownership of `self` (the loop exits after finishing any
    /// in-progress job).
    pub fn stop_handle(&self) -> WorkerStopHandle {
        WorkerStopHandle {
            stop: self.stop.clone(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Runs the claim loop until `stop()` is called on a clone of this
    /// worker's stop handle.
    pub async fn start(&self) -> Result<()> {
        while !self.stop.load(Ordering::Relaxed) {
            let did_work = self.process_one().await?;
            if !did_work {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Ok(())
    }

    /// One claim-loop iteration. Returns whether a job was executed.
    ///
    /// Order, per spec.md §4.2: sweep expired `running` jobs first, then
    /// attempt to select and claim one eligible job, then execute and
    /// finalize it.
    pub async fn process_one(&self) -> Result<bool> {
        match self.store.sweep_timeouts().await {
            Ok(swept) if swept > 0 => {
                tracing::info!(worker_id = %self.worker_id, swept, "timeout sweep reclaimed jobs");
            }
            Ok(_) => {}
            Err(err) => {
                // StoreError recovers locally: log and let the caller's
                // next iteration retry after the poll interval.
                tracing::warn!(worker_id = %self.worker_id, error = %err, "sweep failed, backing off");
                return Ok(false);
            }
        }

        let claimed = match self.store.claim_next(&self.worker_id).await {
            Ok(claimed) => claimed,
            Err(err) => {
                tracing::warn!(worker_id = %self.worker_id, error = %err, "claim failed, backing off");
                return Ok(false);
            }
        };

        let Some(claimed) = claimed else {
            return Ok(false);
        };

        tracing::info!(
            worker_id = %self.worker_id,
            job_id = %claimed.job.id,
            attempt = claimed.job.attempts,
            "claimed job"
        );

        let outcome = self.execute(&claimed.job).await;

        match outcome {
            JobOutcome::Ok(result) => {
                if let Err(err) = self
                    .store
                    .finalize_success(&claimed.job.id, &self.worker_id, &claimed.execution_id, result)
                    .await
                {
                    tracing::warn!(worker_id = %self.worker_id, job_id = %claimed.job.id, error = %err, "finalize_success failed");
                }
            }
            JobOutcome::Err(message) => {
                tracing::info!(worker_id = %self.worker_id, job_id = %claimed.job.id, error = %message, "job attempt failed");
                if let Err(err) = self
                    .store
                    .finalize_failure(&claimed.job.id, &self.worker_id, &claimed.execution_id, message)
                    .await
                {
                    tracing::warn!(worker_id = %self.worker_id, job_id = %claimed.job.id, error = %err, "finalize_failure failed");
                }
            }
        }

        Ok(true)
    }

    /// Resolves the function identifier and calls it. Execution is not
    /// bounded by any transaction; the timeout sweep, not an in-process
    /// timer, is what reclaims a job that outruns `timeout_seconds`
    /// (spec.md §4.4, §9).
    async fn execute(&self, job: &crate::model::Job) -> JobOutcome {
        let function = match self.resolver.resolve(&job.function_identifier).await {
            Ok(function) => function,
            Err(message) => {
                return JobOutcome::Err(JobQueueError::ResolveFailure(message).to_string())
            }
        };
        match function.call(job.parameters.clone()).await {
            JobOutcome::Ok(result) => JobOutcome::Ok(result),
            JobOutcome::Err(message) => {
                JobOutcome::Err(JobQueueError::JobExecutionFailure(message).to_string())
            }
        }
    }
}

/// Clonable handle used to request a running [`Worker`] stop cooperatively.
#[derive(Clone)]
pub struct WorkerStopHandle {
    stop: Arc<AtomicBool>,
}

impl WorkerStopHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Builder for [`Worker`], following the teacher's `RuntimeBuilder`/
/// `EngineBuilder` idiom.
pub struct WorkerBuilder {
    store: Arc<dyn JobStore>,
    resolver: Arc<dyn Resolver>,
    worker_id: Option<String>,
    poll_interval: Duration,
}

impl WorkerBuilder {
    fn new(store: Arc<dyn JobStore>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            store,
            resolver,
            worker_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn build(self) -> Worker {
        let worker_id = self.worker_id.unwrap_or_else(default_worker_id);
        Worker {
            store: self.store,
            resolver: self.resolver,
            worker_id,
            poll_interval: self.poll_interval,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// `host:pid`, the default worker identity spec.md §4.2 specifies.
fn default_worker_id() -> String {
    let host = hostname_or_unknown();
    let pid = std::process::id();
    format!("{host}:{pid}")
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
