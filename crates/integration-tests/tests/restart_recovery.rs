//! Restart behavior: interrupted attempts are re-queued, queued work resumes

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{adapter, fast_config, file_pool, registry, remove_db, temp_db_path, Stack};
use realty_core::application::{EnqueueOptions, RecoveryService};
use realty_core::domain::{ErrorKind, JobState, Portal};
use realty_core::port::portal_adapter::mocks::{MockOutcome, ScriptedPortalAdapter};
use realty_core::port::time_provider::SystemTimeProvider;
use realty_core::port::JobStore;
use realty_core::AppError;
use realty_infra_sqlite::SqliteJobStore;

#[tokio::test]
async fn test_attempt_interrupted_by_crash_is_requeued_and_completes() {
    let path = temp_db_path("crash");

    // First process: the portal call never returns before the crash
    let job_id = {
        let hanging = Arc::new(
            ScriptedPortalAdapter::new(Portal::Idealista).with_script([MockOutcome::Hang]),
        );
        let config = realty_core::application::QueueConfig {
            adapter_timeout: Duration::from_secs(60),
            ..fast_config()
        };
        let stack = Stack::start(file_pool(&path).await, config, registry(&[hanging])).await;
        stack.seed(&["p1"], 180_000.0).await;

        let job = stack
            .queue
            .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
            .await
            .unwrap();
        stack.wait_for(&job.id, JobState::Publishing).await;
        stack.crash().await;
        job.id
    };

    // Second process: recovery runs before the dispatcher
    let pool = file_pool(&path).await;
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let interrupted = store.load_job(&job_id).await.unwrap().unwrap();
    assert_eq!(interrupted.state, JobState::Publishing);

    let recovery = RecoveryService::new(store.clone(), Arc::new(SystemTimeProvider));
    assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 1);

    let requeued = store.load_job(&job_id).await.unwrap().unwrap();
    assert_eq!(requeued.state, JobState::Queued);
    assert_eq!(requeued.attempt, interrupted.attempt);
    assert_eq!(
        requeued.last_error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Retryable)
    );

    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista).with_latency(Duration::from_millis(300)),
    );
    let stack = Stack::start(pool, fast_config(), registry(&[idealista.clone()])).await;

    // the restored job still owns its pair
    assert!(matches!(
        stack
            .queue
            .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
            .await,
        Err(AppError::DuplicateActiveJob { .. })
    ));

    let done = stack.wait_for(&job_id, JobState::Published).await;
    assert_eq!(done.attempt, interrupted.attempt + 1);
    assert!(done.result_url.is_some());

    stack.stop().await.close().await;
    remove_db(&path);
}

#[tokio::test]
async fn test_scheduled_jobs_survive_graceful_restart() {
    let path = temp_db_path("scheduled");
    let due = chrono::Utc::now().timestamp_millis() + 1_500;

    let job_id = {
        let stack = Stack::start(
            file_pool(&path).await,
            fast_config(),
            registry(&[adapter(Portal::Fotocasa)]),
        )
        .await;
        stack.seed(&["p7"], 75_000.0).await;
        let job = stack
            .queue
            .enqueue("p7", Portal::Fotocasa, EnqueueOptions::scheduled(due))
            .await
            .unwrap();
        stack.stop().await.close().await;
        job.id
    };

    let pool = file_pool(&path).await;
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let recovery = RecoveryService::new(store, Arc::new(SystemTimeProvider));
    assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 0);

    let fotocasa = adapter(Portal::Fotocasa);
    let stack = Stack::start(pool, fast_config(), registry(&[fotocasa.clone()])).await;
    assert_eq!(stack.queue.active_jobs().await.len(), 1);

    let done = stack.wait_for(&job_id, JobState::Published).await;
    assert!(chrono::Utc::now().timestamp_millis() >= due);
    assert_eq!(done.scheduled_for, Some(due));
    assert_eq!(fotocasa.call_count(), 1);

    stack.stop().await.close().await;
    remove_db(&path);
}
