//! # jobqueue-core
//!
//! The concurrent job state machine for a lightweight, local-first job
//! queue backed by an embedded relational store.
//!
//! This crate is the hard part: it guarantees **at-most-once dispatch** of
//! any job to any worker, **exactly-one-terminal-state** per attempt, and
//! **forward progress** under crashes, using nothing but the backing
//! store's transaction serializability as a coordination primitive.
//!
//! ## Core concepts
//!
//! - [`Job`](model::Job) — a persisted unit of work: function identifier,
//!   parameters, and retry/timeout/dependency policy.
//! - [`JobExecution`](model::JobExecution) — one attempt at running a job.
//! - [`Queue`] — submission, cancellation, requeue, status query, cleanup.
//! - [`Worker`] — claim-execute-finalize loop and the timeout sweep.
//! - [`Workflow`] — an in-memory dependency DAG submitted as one batch.
//!
//! This crate defines the policy; it never talks SQL directly. A concrete
//! backend (e.g. `jobqueue-sqlite`) implements [`JobStore`] and
//! [`StoreSessionFactory`], the two seams this crate depends on.
//!
//! ## Example
//!
//! ```ignore
//! use jobqueue_core::{JobDefinition, Queue, Worker};
//! use std::sync::Arc;
//!
//! let store = Arc::new(my_sqlite_store);
//! let queue = Queue::new(store.clone()).await?;
//!
//! let id = queue
//!     .submit(JobDefinition::new("send-welcome-email", "emails::send_welcome"), None)
//!     .await?;
//!
//! let worker = Worker::builder(store, resolver).build();
//! worker.start().await?;
//! ```
//!
//! ## What this crate is not
//!
//! Not a CLI, not a table-formatting library, not a function-registration
//! mechanism, and not a connection-pool implementation — those live outside
//! this crate's scope and are treated only through the [`Resolver`] and
//! [`StoreSessionFactory`] traits.

mod error;
mod model;
mod queue;
mod resolver;
mod session;
mod store;
mod worker;
mod workflow;

pub use error::{JobQueueError, Result};
pub use model::{
    ClaimedJob, ExecutionStatus, Job, JobDefinition, JobExecution, JobStatus, JobSummary,
    ListFilter, QueueStats, StatusRecord,
};
pub use queue::Queue;
pub use resolver::{JobFunction, JobOutcome, Resolver};
pub use session::StoreSessionFactory;
pub use store::JobStore;
pub use worker::{Worker, WorkerBuilder, WorkerStopHandle};
pub use workflow::Workflow;
