//! End-to-end scenarios exercised through `Queue` + `Worker`, as a caller
//! assembling the crates would use them, rather than against `SqliteJobStore`
//! directly.

use std::sync::Arc;

use jobqueue_core::{JobDefinition, JobStatus, JobStore, ListFilter, Queue, Worker};
use jobqueue_sqlite::{SqliteJobStore, SqliteSessionFactory};
use jobqueue_testing::{err, ok, FnRegistry};
use serde_json::json;

async fn new_queue() -> (Queue, Arc<SqliteJobStore>) {
    let factory = SqliteSessionFactory::open("sqlite::memory:").await.unwrap();
    let store = Arc::new(SqliteJobStore::from_factory(&factory));
    let queue = Queue::new(store.clone()).await.unwrap();
    (queue, store)
}

#[tokio::test]
async fn s1_single_job_runs_to_completion() {
    let (queue, store) = new_queue().await;
    let registry = Arc::new(FnRegistry::new());
    registry.register("double", |params: serde_json::Value| async move {
        let n = params["n"].as_i64().unwrap_or(0);
        ok(json!({"doubled": n * 2}))
    });

    let job_id = queue
        .submit(
            JobDefinition::new("double-it", "double").with_parameters(json!({"n": 21})),
            None,
        )
        .await
        .unwrap();

    let worker = Worker::builder(store, registry).worker_id("test-worker").build();
    let did_work = worker.process_one().await.unwrap();
    assert!(did_work);

    let status = queue.get_status(&job_id).await.unwrap();
    assert_eq!(status.job.status, JobStatus::Completed);
    assert_eq!(status.job.result, Some(json!({"doubled": 42})));
    assert_eq!(status.executions.len(), 1);
    assert_eq!(status.executions[0].status, jobqueue_core::ExecutionStatus::Completed);
}

#[tokio::test]
async fn s2_job_exhausts_retries_and_fails() {
    let (queue, store) = new_queue().await;
    let registry = Arc::new(FnRegistry::new());
    registry.register("always_fails", |_| async move { err("nope") });

    let job_id = queue
        .submit(
            JobDefinition::new("doomed", "always_fails").with_max_attempts(2),
            None,
        )
        .await
        .unwrap();

    let worker = Worker::builder(store, registry).worker_id("test-worker").build();
    assert!(worker.process_one().await.unwrap());
    assert_eq!(
        queue.get_status(&job_id).await.unwrap().job.status,
        JobStatus::Pending
    );

    assert!(worker.process_one().await.unwrap());
    let status = queue.get_status(&job_id).await.unwrap();
    assert_eq!(status.job.status, JobStatus::Failed);
    assert_eq!(status.job.attempts, 2);
    assert_eq!(status.executions.len(), 2);
}

#[tokio::test]
async fn s3_downstream_job_waits_for_its_dependency() {
    let (queue, store) = new_queue().await;
    let registry = Arc::new(FnRegistry::new());
    registry.register("noop", |_| async move { ok(json!(null)) });

    let a_id = queue
        .submit(JobDefinition::new("a", "noop"), None)
        .await
        .unwrap();
    let b_id = queue
        .submit(
            JobDefinition::new("b", "noop").depends_on([a_id.clone()]),
            None,
        )
        .await
        .unwrap();

    let worker = Worker::builder(store, registry).worker_id("test-worker").build();

    // First iteration: only "a" is eligible.
    assert!(worker.process_one().await.unwrap());
    assert_eq!(
        queue.get_status(&a_id).await.unwrap().job.status,
        JobStatus::Completed
    );
    assert_eq!(
        queue.get_status(&b_id).await.unwrap().job.status,
        JobStatus::Pending
    );

    // Second iteration: "b" is now eligible.
    assert!(worker.process_one().await.unwrap());
    assert_eq!(
        queue.get_status(&b_id).await.unwrap().job.status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn s4_timeout_sweep_recovers_a_stuck_job() {
    let (queue, store) = new_queue().await;
    let registry = Arc::new(FnRegistry::new());
    registry.register("noop", |_| async move { ok(json!(null)) });

    let job_id = queue
        .submit(
            JobDefinition::new("hangs", "noop").with_timeout_seconds(1),
            None,
        )
        .await
        .unwrap();

    // Claim it directly (bypassing the worker's execute step) to simulate a
    // worker that died mid-execution.
    let claimed = store.claim_next("dead-worker").await.unwrap().unwrap();
    assert_eq!(claimed.job.id, job_id);

    sqlx::query("UPDATE jobs SET started_at = datetime('now', '-10 seconds') WHERE id = ?")
        .bind(&job_id)
        .execute(&store.pool())
        .await
        .unwrap();

    let swept = store.sweep_timeouts().await.unwrap();
    assert_eq!(swept, 1);
    assert_eq!(
        queue.get_status(&job_id).await.unwrap().job.status,
        JobStatus::Pending
    );

    let worker = Worker::builder(store, registry).worker_id("recovery-worker").build();
    assert!(worker.process_one().await.unwrap());
    assert_eq!(
        queue.get_status(&job_id).await.unwrap().job.status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn s5_cancel_then_cancel_again_is_idempotent() {
    let (queue, _store) = new_queue().await;
    let job_id = queue
        .submit(JobDefinition::new("throwaway", "noop"), None)
        .await
        .unwrap();

    assert!(queue.cancel(&job_id).await.unwrap());
    assert_eq!(
        queue.get_status(&job_id).await.unwrap().job.status,
        JobStatus::Cancelled
    );
    assert!(!queue.cancel(&job_id).await.unwrap());
}

#[tokio::test]
async fn s6_a_full_workflow_dag_completes() {
    let (queue, store) = new_queue().await;
    let registry = Arc::new(FnRegistry::new());
    registry.register("noop", |_| async move { ok(json!(null)) });

    let mut workflow = jobqueue_core::Workflow::new();
    workflow
        .add_job(JobDefinition::new("fetch", "noop"), &[])
        .unwrap();
    workflow
        .add_job(JobDefinition::new("transform", "noop"), &["fetch"])
        .unwrap();
    workflow
        .add_job(JobDefinition::new("publish", "noop"), &["transform"])
        .unwrap();

    let assigned = workflow.submit_all(&queue).await.unwrap();
    assert_eq!(assigned.len(), 3);

    let worker = Worker::builder(store, registry).worker_id("test-worker").build();
    for _ in 0..3 {
        assert!(worker.process_one().await.unwrap());
    }

    for name in ["fetch", "transform", "publish"] {
        let id = &assigned[name];
        let status = queue.get_status(id).await.unwrap();
        assert_eq!(status.job.status, JobStatus::Completed);
        assert_eq!(
            status.job.executing_workflow_id.as_deref(),
            Some(workflow.id())
        );
    }

    let in_workflow = queue
        .list(ListFilter::new().with_workflow_id(workflow.id()))
        .await
        .unwrap();
    assert_eq!(in_workflow.len(), 3);
}
