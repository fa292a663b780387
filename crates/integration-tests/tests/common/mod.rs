//! Shared wiring: real SQLite stores, scripted portal adapters

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use realty_core::application::{
    shutdown_channel, BulkOperationCoordinator, PublicationQueue, QueueConfig, RetryPolicy,
    ShutdownSender, StatusHub,
};
use realty_core::domain::{JobState, Portal, PortalSettings, Property, PublicationJob};
use realty_core::port::id_provider::UuidProvider;
use realty_core::port::portal_adapter::mocks::ScriptedPortalAdapter;
use realty_core::port::time_provider::SystemTimeProvider;
use realty_core::port::{JobStore, PortalRegistry};
use realty_infra_sqlite::{
    create_pool, run_migrations, SqliteBulkOperationStore, SqliteJobStore, SqlitePropertyCatalog,
};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(10);

pub fn fast_config() -> QueueConfig {
    QueueConfig {
        adapter_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50))
            .with_jitter(0.0),
        ..QueueConfig::default()
    }
}

pub async fn memory_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Unique on-disk database for tests that restart the process
pub fn temp_db_path(name: &str) -> PathBuf {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!(
        "realty_{}_{}_{}.db",
        name,
        std::process::id(),
        nanos
    ))
}

pub fn remove_db(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

pub async fn file_pool(path: &PathBuf) -> SqlitePool {
    let pool = create_pool(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub fn adapter(portal: Portal) -> Arc<ScriptedPortalAdapter> {
    Arc::new(ScriptedPortalAdapter::new(portal))
}

pub fn registry(adapters: &[Arc<ScriptedPortalAdapter>]) -> PortalRegistry {
    let mut registry = PortalRegistry::new();
    for adapter in adapters {
        registry.register(adapter.clone(), PortalSettings::default());
    }
    registry
}

/// Queue, dispatcher and bulk coordinator over one SQLite database
pub struct Stack {
    pub pool: SqlitePool,
    pub queue: PublicationQueue,
    pub bulk: Arc<BulkOperationCoordinator>,
    pub jobs: Arc<SqliteJobStore>,
    pub catalog: Arc<SqlitePropertyCatalog>,
    shutdown: ShutdownSender,
    dispatcher: JoinHandle<()>,
}

impl Stack {
    /// Wire everything, rebuild the queue cache, then start the dispatcher
    pub async fn start(pool: SqlitePool, config: QueueConfig, portals: PortalRegistry) -> Self {
        let clock = Arc::new(SystemTimeProvider);
        let ids = Arc::new(UuidProvider);
        let jobs = Arc::new(SqliteJobStore::new(pool.clone()));
        let catalog = Arc::new(SqlitePropertyCatalog::new(pool.clone(), clock.clone()));
        let operations = Arc::new(SqliteBulkOperationStore::new(pool.clone()));

        let queue = PublicationQueue::new(
            config,
            jobs.clone(),
            catalog.clone(),
            portals,
            StatusHub::new(),
            ids.clone(),
            clock.clone(),
        );
        queue.restore().await.unwrap();

        let bulk = Arc::new(BulkOperationCoordinator::new(
            queue.clone(),
            catalog.clone(),
            jobs.clone(),
            operations,
            ids,
            clock,
        ));

        let (shutdown, token) = shutdown_channel();
        let dispatcher = queue.spawn(token);
        Self {
            pool,
            queue,
            bulk,
            jobs,
            catalog,
            shutdown,
            dispatcher,
        }
    }

    pub async fn seed(&self, ids: &[&str], price: f64) {
        for id in ids {
            self.catalog
                .upsert_property(&Property {
                    id: id.to_string(),
                    reference: format!("REF-{}", id),
                    title: format!("Flat {}", id),
                    price,
                    attributes: serde_json::json!({ "rooms": 3 }),
                })
                .await
                .unwrap();
        }
    }

    /// Poll the store until the job reaches `state`
    pub async fn wait_for(&self, job_id: &str, state: JobState) -> PublicationJob {
        let jobs = self.jobs.clone();
        let id = job_id.to_string();
        tokio::time::timeout(WAIT, async move {
            loop {
                if let Some(job) = jobs.load_job(&id).await.unwrap() {
                    if job.state == state {
                        return job;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job {} never reached {}", job_id, state))
    }

    pub async fn wait_terminal(&self, job_ids: &[String]) {
        let jobs = self.jobs.clone();
        let ids = job_ids.to_vec();
        tokio::time::timeout(WAIT, async move {
            loop {
                let mut done = 0;
                for id in &ids {
                    if let Some(job) = jobs.load_job(id).await.unwrap() {
                        if job.state.is_terminal() {
                            done += 1;
                        }
                    }
                }
                if done == ids.len() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs never settled");
    }

    /// Graceful stop: in-flight attempts finish first
    pub async fn stop(self) -> SqlitePool {
        self.shutdown.shutdown();
        tokio::time::timeout(WAIT, self.dispatcher)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
        self.pool
    }

    /// Simulated crash: the dispatcher dies without persisting anything else
    pub async fn crash(self) {
        self.dispatcher.abort();
        let _ = self.dispatcher.await;
        self.pool.close().await;
    }
}
