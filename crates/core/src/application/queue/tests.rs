use super::*;
use crate::domain::{ErrorKind, JobState, PortalSettings, StatusEventKind};
use crate::port::id_provider::SequenceIdProvider;
use crate::port::job_store::mocks::InMemoryJobStore;
use crate::port::portal_adapter::mocks::{ConcurrencyTracker, MockOutcome, ScriptedPortalAdapter};
use crate::port::property_catalog::mocks::InMemoryPropertyCatalog;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::AdapterError;

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> QueueConfig {
    QueueConfig {
        adapter_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
        retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40))
            .with_jitter(0.0),
        ..QueueConfig::default()
    }
}

struct Harness {
    queue: PublicationQueue,
    store: Arc<InMemoryJobStore>,
    shutdown: ShutdownSender,
    handle: JoinHandle<()>,
}

impl Harness {
    fn start(config: QueueConfig, adapters: Vec<Arc<ScriptedPortalAdapter>>) -> Self {
        let ids: Vec<String> = (0..20).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let catalog = Arc::new(InMemoryPropertyCatalog::with_properties(&refs, 100_000.0));
        Self::start_with(config, adapters, Arc::new(InMemoryJobStore::new()), catalog)
    }

    fn start_with(
        config: QueueConfig,
        adapters: Vec<Arc<ScriptedPortalAdapter>>,
        store: Arc<InMemoryJobStore>,
        catalog: Arc<InMemoryPropertyCatalog>,
    ) -> Self {
        let queue = build_queue(config, adapters, store.clone(), catalog);
        let (shutdown, token) = shutdown_channel();
        let handle = queue.spawn(token);
        Self {
            queue,
            store,
            shutdown,
            handle,
        }
    }

    async fn wait_for(&self, job_id: &str, state: JobState) -> PublicationJob {
        let store = self.store.clone();
        let id = job_id.to_string();
        tokio::time::timeout(WAIT, async move {
            loop {
                if let Some(job) = store.load_job(&id).await.unwrap() {
                    if job.state == state {
                        return job;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job {} never reached {}", job_id, state))
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }
}

fn build_queue(
    config: QueueConfig,
    adapters: Vec<Arc<ScriptedPortalAdapter>>,
    store: Arc<InMemoryJobStore>,
    catalog: Arc<InMemoryPropertyCatalog>,
) -> PublicationQueue {
    let mut registry = PortalRegistry::new();
    for adapter in adapters {
        registry.register(adapter, PortalSettings::default());
    }
    PublicationQueue::new(
        config,
        store,
        catalog,
        registry,
        StatusHub::new(),
        Arc::new(SequenceIdProvider::new("job")),
        Arc::new(SystemTimeProvider),
    )
}

fn adapter(portal: Portal) -> Arc<ScriptedPortalAdapter> {
    Arc::new(ScriptedPortalAdapter::new(portal))
}

#[tokio::test]
async fn test_successful_publication_walks_full_lifecycle() {
    let idealista = adapter(Portal::Idealista);
    let h = Harness::start(test_config(), vec![idealista.clone()]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Queued);

    let done = h.wait_for(&job.id, JobState::Published).await;
    assert_eq!(done.attempt, 1);
    assert_eq!(done.progress, 100);
    assert_eq!(
        done.result_url.as_deref(),
        Some("https://idealista.example/listings/p1")
    );
    assert_eq!(
        h.store.states_of(&job.id),
        vec![
            JobState::Queued,
            JobState::Dispatching,
            JobState::Publishing,
            JobState::Published
        ]
    );
    assert_eq!(idealista.call_count(), 1);
    assert!(h.queue.active_jobs().await.is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_duplicate_active_pair_is_rejected() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    let later = EnqueueOptions::scheduled(chrono::Utc::now().timestamp_millis() + 60_000);

    let first = h.queue.enqueue("p1", Portal::Idealista, later).await.unwrap();
    let err = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap_err();
    match err {
        AppError::DuplicateActiveJob {
            existing_job_id, ..
        } => assert_eq!(existing_job_id, first.id),
        other => panic!("unexpected error: {:?}", other),
    }

    // once terminal the pair is free again
    h.queue.cancel(&first.id).await.unwrap();
    let second = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    h.wait_for(&second.id, JobState::Published).await;
    h.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueues_leave_one_active_job() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    let later = chrono::Utc::now().timestamp_millis() + 60_000;

    let attempts = (0..16).map(|_| {
        let queue = h.queue.clone();
        async move {
            queue
                .enqueue("p1", Portal::Idealista, EnqueueOptions::scheduled(later))
                .await
        }
    });
    let results = futures::future::join_all(attempts).await;

    let accepted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(accepted.len(), 1);
    let winner = accepted[0].id.clone();
    for result in &results {
        match result {
            Ok(_) => {}
            Err(AppError::DuplicateActiveJob {
                existing_job_id, ..
            }) => assert_eq!(existing_job_id, &winner),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    let active = h.store.load_active_jobs_for_property("p1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, winner);
    assert_eq!(h.store.all_jobs().len(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_unknown_portal_and_blank_property_rejected() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    assert!(matches!(
        h.queue
            .enqueue("p1", Portal::Fotocasa, EnqueueOptions::default())
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.queue
            .enqueue("  ", Portal::Idealista, EnqueueOptions::default())
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(h.store.all_jobs().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_per_portal_limit_is_never_exceeded() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista).with_latency(Duration::from_millis(15)),
    );
    let h = Harness::start(test_config(), vec![idealista.clone()]);

    let mut jobs = Vec::new();
    for i in 0..10 {
        let job = h
            .queue
            .enqueue(&format!("p{}", i), Portal::Idealista, EnqueueOptions::default())
            .await
            .unwrap();
        jobs.push(job);
    }
    for job in &jobs {
        h.wait_for(&job.id, JobState::Published).await;
    }

    assert_eq!(idealista.call_count(), 10);
    assert_eq!(idealista.peak_concurrency(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_global_limit_is_never_exceeded() {
    let shared = ConcurrencyTracker::new();
    let adapters: Vec<_> = [Portal::Idealista, Portal::Fotocasa, Portal::Habitaclia]
        .into_iter()
        .map(|portal| {
            Arc::new(
                ScriptedPortalAdapter::new(portal)
                    .with_latency(Duration::from_millis(20))
                    .with_tracker(shared.clone()),
            )
        })
        .collect();
    let config = QueueConfig {
        global_concurrency: 4,
        per_portal_concurrency: 2,
        ..test_config()
    };
    let h = Harness::start(config, adapters.clone());

    let mut jobs = Vec::new();
    for i in 0..6 {
        for portal in [Portal::Idealista, Portal::Fotocasa, Portal::Habitaclia] {
            jobs.push(
                h.queue
                    .enqueue(&format!("p{}", i), portal, EnqueueOptions::default())
                    .await
                    .unwrap(),
            );
        }
    }
    for job in &jobs {
        h.wait_for(&job.id, JobState::Published).await;
    }

    assert!(shared.peak() <= 4, "global peak {}", shared.peak());
    for adapter in &adapters {
        assert!(adapter.peak_concurrency() <= 2);
    }
    assert_eq!(h.queue.in_flight().await, 0);
    h.stop().await;
}

#[tokio::test]
async fn test_retryable_failure_is_retried_then_succeeds() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista).with_script([
            MockOutcome::Fail(AdapterError::Retryable("503 Service Unavailable".into())),
            MockOutcome::Success,
        ]),
    );
    let h = Harness::start(test_config(), vec![idealista.clone()]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    let done = h.wait_for(&job.id, JobState::Published).await;

    assert_eq!(done.attempt, 2);
    assert_eq!(idealista.call_count(), 2);
    assert_eq!(
        h.store.states_of(&job.id),
        vec![
            JobState::Queued,
            JobState::Dispatching,
            JobState::Publishing,
            JobState::Queued,
            JobState::Dispatching,
            JobState::Publishing,
            JobState::Published
        ]
    );
    h.stop().await;
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job() {
    let idealista = Arc::new(ScriptedPortalAdapter::new(Portal::Idealista).with_script(
        std::iter::repeat(MockOutcome::Fail(AdapterError::Retryable("busy".into()))).take(3),
    ));
    let h = Harness::start(test_config(), vec![idealista.clone()]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    let failed = h.wait_for(&job.id, JobState::Failed).await;

    assert_eq!(failed.attempt, 3);
    assert_eq!(idealista.call_count(), 3);
    let error = failed.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Retryable);
    assert_eq!(error.message, "busy");
    h.stop().await;
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista).with_script([MockOutcome::Fail(
            AdapterError::Permanent("listing rejected".into()),
        )]),
    );
    let h = Harness::start(test_config(), vec![idealista.clone()]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    let failed = h.wait_for(&job.id, JobState::Failed).await;

    assert_eq!(failed.attempt, 1);
    assert_eq!(idealista.call_count(), 1);
    assert_eq!(failed.last_error.unwrap().kind, ErrorKind::Permanent);
    h.stop().await;
}

#[tokio::test]
async fn test_hanging_adapter_times_out_and_retries() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista)
            .with_script([MockOutcome::Hang, MockOutcome::Success]),
    );
    let config = QueueConfig {
        adapter_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let h = Harness::start(config, vec![idealista.clone()]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    let done = h.wait_for(&job.id, JobState::Published).await;

    assert_eq!(done.attempt, 2);
    assert_eq!(done.last_error.unwrap().kind, ErrorKind::Timeout);
    h.stop().await;
}

#[tokio::test]
async fn test_adapter_panic_fails_only_that_job() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista)
            .with_script([MockOutcome::Panic("adapter bug".into())]),
    );
    let h = Harness::start(test_config(), vec![idealista.clone()]);

    let crashed = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    let failed = h.wait_for(&crashed.id, JobState::Failed).await;
    let error = failed.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Permanent);
    assert!(error.message.contains("adapter bug"));

    // dispatcher keeps going
    let next = h
        .queue
        .enqueue("p2", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    h.wait_for(&next.id, JobState::Published).await;
    h.stop().await;
}

#[tokio::test]
async fn test_missing_property_fails_permanently() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    let job = h
        .queue
        .enqueue("ghost", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    let failed = h.wait_for(&job.id, JobState::Failed).await;
    assert_eq!(failed.last_error.unwrap().kind, ErrorKind::Permanent);
    h.stop().await;
}

#[tokio::test]
async fn test_progress_is_persisted_monotonically() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista)
            .with_script([MockOutcome::Progress(vec![10, 50, 30, 50, 80])]),
    );
    let h = Harness::start(test_config(), vec![idealista]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    h.wait_for(&job.id, JobState::Published).await;

    let progress: Vec<u8> = h
        .store
        .history()
        .into_iter()
        .filter(|(id, state, _)| id == &job.id && *state == JobState::Publishing)
        .map(|(_, _, progress)| progress)
        .collect();
    assert_eq!(progress, vec![0, 10, 50, 80]);
    h.stop().await;
}

#[tokio::test]
async fn test_events_follow_persisted_order() {
    let h = Harness::start(
        test_config(),
        vec![Arc::new(
            ScriptedPortalAdapter::new(Portal::Idealista)
                .with_latency(Duration::from_millis(10))
                .with_script([MockOutcome::Progress(vec![40])]),
        )],
    );
    let mut subscription = h.queue.subscribe(&["p1".to_string()]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();

    let mut statuses = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.data.job_id, job.id);
        statuses.push((event.data.status, event.data.progress));
        if event.kind == StatusEventKind::PublicationComplete {
            assert_eq!(
                event.data.url.as_deref(),
                Some("https://idealista.example/listings/p1")
            );
            break;
        }
    }

    assert_eq!(
        statuses,
        vec![
            (JobState::Queued, None),
            (JobState::Dispatching, None),
            (JobState::Publishing, Some(0)),
            (JobState::Publishing, Some(40)),
            (JobState::Published, Some(100)),
        ]
    );
    h.stop().await;
}

#[tokio::test]
async fn test_scheduled_job_waits_until_due() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    let due = chrono::Utc::now().timestamp_millis() + 150;

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::scheduled(due))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.queue.cached_state(&job.id).await, Some(JobState::Queued));

    let done = h.wait_for(&job.id, JobState::Published).await;
    assert!(done.updated_at >= due);
    h.stop().await;
}

#[tokio::test]
async fn test_cancel_rules() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    let later = EnqueueOptions::scheduled(chrono::Utc::now().timestamp_millis() + 60_000);

    let queued = h.queue.enqueue("p1", Portal::Idealista, later).await.unwrap();
    let canceled = h.queue.cancel(&queued.id).await.unwrap();
    assert_eq!(canceled.state, JobState::Canceled);
    assert_eq!(
        h.store.load_job(&queued.id).await.unwrap().unwrap().state,
        JobState::Canceled
    );

    let published = h
        .queue
        .enqueue("p2", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    h.wait_for(&published.id, JobState::Published).await;
    assert!(matches!(
        h.queue.cancel(&published.id).await,
        Err(AppError::NotCancelable {
            state: JobState::Published,
            ..
        })
    ));

    assert!(matches!(
        h.queue.cancel("missing").await,
        Err(AppError::NotFound(_))
    ));
    h.stop().await;
}

#[tokio::test]
async fn test_failed_enqueue_save_leaves_no_trace() {
    let h = Harness::start(test_config(), vec![adapter(Portal::Idealista)]);
    let mut subscription = h.queue.subscribe(&["p1".to_string()]);

    h.store.set_fail_saves(true);
    assert!(matches!(
        h.queue
            .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
            .await,
        Err(AppError::Database(_))
    ));
    assert!(h.queue.active_jobs().await.is_empty());

    h.store.set_fail_saves(false);
    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    // first event seen belongs to the persisted job
    let first = tokio::time::timeout(WAIT, subscription.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.data.job_id, job.id);
    h.stop().await;
}

#[tokio::test]
async fn test_restore_resumes_persisted_queue() {
    let store = Arc::new(InMemoryJobStore::new());
    let mut pending = PublicationJob::new(
        "persisted-1",
        chrono::Utc::now().timestamp_millis(),
        "p1",
        Portal::Idealista,
        PublicationAction::Publish,
    );
    pending.max_attempts = 3;
    store.save_job(&pending).await.unwrap();

    let catalog = Arc::new(InMemoryPropertyCatalog::with_properties(&["p1"], 1.0));
    let queue = build_queue(
        test_config(),
        vec![adapter(Portal::Idealista)],
        store.clone(),
        catalog.clone(),
    );
    assert_eq!(queue.restore().await.unwrap(), 1);

    // the restored job still blocks duplicates
    assert!(matches!(
        queue
            .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
            .await,
        Err(AppError::DuplicateActiveJob { .. })
    ));

    let (shutdown, token) = shutdown_channel();
    let h = Harness {
        handle: queue.spawn(token),
        queue,
        store,
        shutdown,
    };
    h.wait_for("persisted-1", JobState::Published).await;
    h.stop().await;
}

#[tokio::test]
async fn test_current_jobs_returns_latest_per_portal() {
    let h = Harness::start(
        test_config(),
        vec![adapter(Portal::Idealista), adapter(Portal::Fotocasa)],
    );

    let first = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    h.wait_for(&first.id, JobState::Published).await;
    tokio::time::sleep(Duration::from_millis(2)).await;

    let later = EnqueueOptions::scheduled(chrono::Utc::now().timestamp_millis() + 60_000);
    let second = h.queue.enqueue("p1", Portal::Idealista, later).await.unwrap();
    let other = h.queue.enqueue("p1", Portal::Fotocasa, later).await.unwrap();

    let current = h.queue.current_jobs(&["p1".to_string()]).await.unwrap();
    let ids: Vec<_> = current.iter().map(|j| j.id.clone()).collect();
    assert_eq!(ids, vec![second.id, other.id]);
    h.stop().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_attempt() {
    let idealista = Arc::new(
        ScriptedPortalAdapter::new(Portal::Idealista).with_latency(Duration::from_millis(80)),
    );
    let h = Harness::start(test_config(), vec![idealista]);

    let job = h
        .queue
        .enqueue("p1", Portal::Idealista, EnqueueOptions::default())
        .await
        .unwrap();
    h.wait_for(&job.id, JobState::Publishing).await;

    let store = h.store.clone();
    h.stop().await;
    assert_eq!(
        store.load_job(&job.id).await.unwrap().unwrap().state,
        JobState::Published
    );
}
