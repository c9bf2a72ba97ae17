//! Multi-worker contention: every pending job must be claimed by exactly one
//! worker, modeled on the corpus's own `sqlite_claim_stress` harness.

use std::sync::Arc;

use dashmap::DashSet;
use jobqueue_core::{JobDefinition, JobStore, Queue};
use jobqueue_sqlite::{SqliteJobStore, SqliteSessionFactory};
use tempfile::TempDir;
use tokio::task::JoinSet;

const JOB_COUNT: usize = 200;
const WORKER_COUNT: usize = 16;

#[tokio::test]
async fn only_one_worker_ever_claims_a_given_job() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("stress.db");
    let factory = SqliteSessionFactory::open(&format!("sqlite://{}", db_path.display()))
        .await
        .unwrap();
    let store = Arc::new(SqliteJobStore::from_factory(&factory));
    let queue = Queue::new(store.clone()).await.unwrap();

    let mut job_ids = Vec::with_capacity(JOB_COUNT);
    for i in 0..JOB_COUNT {
        let id = queue
            .submit(JobDefinition::new(format!("job-{i}"), "noop"), None)
            .await
            .unwrap();
        job_ids.push(id);
    }

    let claimed_ids: Arc<DashSet<String>> = Arc::new(DashSet::new());
    let double_claims: Arc<DashSet<String>> = Arc::new(DashSet::new());

    let mut workers = JoinSet::new();
    for worker_index in 0..WORKER_COUNT {
        let store = store.clone();
        let claimed_ids = claimed_ids.clone();
        let double_claims = double_claims.clone();
        workers.spawn(async move {
            let worker_id = format!("stress-worker-{worker_index}");
            loop {
                let jitter_ms = fastrand::u64(0..5);
                tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;

                match store.claim_next(&worker_id).await {
                    Ok(Some(claimed)) => {
                        if !claimed_ids.insert(claimed.job.id.clone()) {
                            double_claims.insert(claimed.job.id.clone());
                        }
                        store
                            .finalize_success(
                                &claimed.job.id,
                                &worker_id,
                                &claimed.execution_id,
                                serde_json::json!(null),
                            )
                            .await
                            .unwrap();
                    }
                    Ok(None) => break,
                    Err(_) => continue,
                }
            }
        });
    }

    while workers.join_next().await.is_some() {}

    assert!(
        double_claims.is_empty(),
        "jobs claimed by more than one worker: {double_claims:?}"
    );
    assert_eq!(claimed_ids.len(), JOB_COUNT);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, JOB_COUNT as i64);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.running, 0);

    for id in job_ids {
        assert_eq!(
            queue.get_status(&id).await.unwrap().job.status,
            jobqueue_core::JobStatus::Completed
        );
    }
}
