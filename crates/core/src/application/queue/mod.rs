// Publication Queue - accepts jobs and dispatches them to portal adapters
//
// Concurrency is bounded globally and per portal. Every state change is
// written to the JobStore before it is cached or published on the StatusHub.

pub mod constants;
mod dispatch;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::RetryPolicy;
use crate::application::status_hub::{StatusHub, StatusSubscription};
use crate::domain::{
    JobId, Portal, PropertyId, PublicationAction, PublicationJob, StatusEvent,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, PortalRegistry, PropertyCatalog, TimeProvider};
use constants::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum adapter calls in flight across all portals
    pub global_concurrency: usize,
    /// Default maximum adapter calls in flight per portal
    pub per_portal_concurrency: usize,
    /// Per-portal overrides of `per_portal_concurrency`
    pub portal_concurrency: HashMap<Portal, usize>,
    pub adapter_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            per_portal_concurrency: DEFAULT_PER_PORTAL_CONCURRENCY,
            portal_concurrency: HashMap::new(),
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn limit_for(&self, portal: Portal) -> usize {
        self.portal_concurrency
            .get(&portal)
            .copied()
            .unwrap_or(self.per_portal_concurrency)
            .max(1)
    }

    fn global_limit(&self) -> usize {
        self.global_concurrency.max(1)
    }
}

/// Optional enqueue parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub action: PublicationAction,
    /// Do not dispatch before this epoch-ms instant
    pub scheduled_for: Option<i64>,
}

impl EnqueueOptions {
    pub fn scheduled(at_millis: i64) -> Self {
        Self {
            scheduled_for: Some(at_millis),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: PublicationAction) -> Self {
        self.action = action;
        self
    }
}

/// Cache of active jobs plus slot accounting. Rebuildable from the store.
#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobId, PublicationJob>,
    pairs: HashMap<(PropertyId, Portal), JobId>,
    running: usize,
    running_by_portal: HashMap<Portal, usize>,
}

impl QueueState {
    fn cache(&mut self, job: PublicationJob) {
        let key = (job.property_id.clone(), job.portal);
        if job.is_terminal() {
            self.jobs.remove(&job.id);
            if self.pairs.get(&key) == Some(&job.id) {
                self.pairs.remove(&key);
            }
        } else {
            self.pairs.insert(key, job.id.clone());
            self.jobs.insert(job.id.clone(), job);
        }
    }

    fn running_for(&self, portal: Portal) -> usize {
        self.running_by_portal.get(&portal).copied().unwrap_or(0)
    }

    fn acquire(&mut self, portal: Portal) {
        self.running += 1;
        *self.running_by_portal.entry(portal).or_insert(0) += 1;
    }

    fn release(&mut self, portal: Portal) {
        self.running = self.running.saturating_sub(1);
        if let Some(count) = self.running_by_portal.get_mut(&portal) {
            *count = count.saturating_sub(1);
        }
    }
}

struct QueueInner {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn PropertyCatalog>,
    portals: PortalRegistry,
    hub: StatusHub,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn TimeProvider>,
    state: Mutex<QueueState>,
    wakeup: Notify,
}

impl QueueInner {
    /// Persist, then update the cache, then publish.
    ///
    /// Callers hold the state lock so events for one job leave in the order
    /// they were persisted.
    async fn commit(&self, state: &mut QueueState, job: PublicationJob) -> Result<()> {
        self.store.save_job(&job).await?;
        let event = StatusEvent::from_job(&job);
        state.cache(job);
        self.hub.publish(event);
        Ok(())
    }
}

/// Handle to the publication queue. Cheap to clone.
#[derive(Clone)]
pub struct PublicationQueue {
    inner: Arc<QueueInner>,
}

impl PublicationQueue {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn PropertyCatalog>,
        portals: PortalRegistry,
        hub: StatusHub,
        ids: Arc<dyn IdProvider>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                store,
                catalog,
                portals,
                hub,
                ids,
                clock,
                state: Mutex::new(QueueState::default()),
                wakeup: Notify::new(),
            }),
        }
    }

    pub fn status_hub(&self) -> &StatusHub {
        &self.inner.hub
    }

    pub fn subscribe(&self, property_ids: &[PropertyId]) -> StatusSubscription {
        self.inner.hub.subscribe(property_ids.iter().cloned())
    }

    /// Whether an adapter is registered for the portal
    pub fn supports(&self, portal: Portal) -> bool {
        self.inner.portals.contains(portal)
    }

    pub fn portals(&self) -> Vec<Portal> {
        self.inner.portals.portals()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Create a `Queued` job for (property, portal).
    ///
    /// Returns as soon as the job is persisted; dispatch happens in the
    /// background loop.
    pub async fn enqueue(
        &self,
        property_id: &str,
        portal: Portal,
        options: EnqueueOptions,
    ) -> Result<PublicationJob> {
        let property_id = property_id.trim();
        if property_id.is_empty() {
            return Err(AppError::Validation(
                "property_id must not be empty".to_string(),
            ));
        }
        if !self.supports(portal) {
            return Err(AppError::Validation(format!(
                "portal {} is not enabled",
                portal
            )));
        }

        let mut state = self.inner.state.lock().await;
        if let Some(existing) = state.pairs.get(&(property_id.to_string(), portal)) {
            return Err(AppError::DuplicateActiveJob {
                property_id: property_id.to_string(),
                portal,
                existing_job_id: existing.clone(),
            });
        }

        let now = self.inner.clock.now_millis();
        let mut job = PublicationJob::new(
            self.inner.ids.generate_id(),
            now,
            property_id,
            portal,
            options.action,
        );
        job.max_attempts = self.inner.config.retry.max_attempts;
        job.scheduled_for = options.scheduled_for;

        self.inner.commit(&mut state, job.clone()).await?;
        drop(state);

        info!(
            job_id = %job.id,
            property_id = %job.property_id,
            portal = %portal,
            action = %job.action,
            scheduled_for = ?job.scheduled_for,
            "Job enqueued"
        );
        self.inner.wakeup.notify_one();
        Ok(job)
    }

    /// Cancel a job that has not reached its adapter yet
    pub async fn cancel(&self, job_id: &str) -> Result<PublicationJob> {
        let mut state = self.inner.state.lock().await;
        if let Some(current) = state.jobs.get(job_id).cloned() {
            let mut job = current.clone();
            if job.cancel(self.inner.clock.now_millis()).is_err() {
                return Err(AppError::NotCancelable {
                    job_id: current.id,
                    state: current.state,
                });
            }
            self.inner.commit(&mut state, job.clone()).await?;
            info!(job_id = %job.id, previous_state = %current.state, "Job canceled");
            return Ok(job);
        }
        drop(state);

        match self.inner.store.load_job(&job_id.to_string()).await? {
            Some(job) => Err(AppError::NotCancelable {
                job_id: job.id,
                state: job.state,
            }),
            None => Err(AppError::NotFound(format!("Job {} not found", job_id))),
        }
    }

    pub async fn job(&self, job_id: &str) -> Result<Option<PublicationJob>> {
        self.inner.store.load_job(&job_id.to_string()).await
    }

    /// Latest job per (property, portal) for the given properties.
    ///
    /// This is the reconciliation snapshot clients fetch after (re)connecting.
    pub async fn current_jobs(&self, property_ids: &[PropertyId]) -> Result<Vec<PublicationJob>> {
        let mut current = Vec::new();
        for property_id in property_ids {
            let mut latest: BTreeMap<Portal, PublicationJob> = BTreeMap::new();
            for job in self.inner.store.load_jobs_for_property(property_id).await? {
                let newer = match latest.get(&job.portal) {
                    Some(seen) => {
                        (job.created_at, job.is_active()) >= (seen.created_at, seen.is_active())
                    }
                    None => true,
                };
                if newer {
                    latest.insert(job.portal, job);
                }
            }
            current.extend(latest.into_values());
        }
        Ok(current)
    }

    /// Snapshot of cached non-terminal jobs
    pub async fn active_jobs(&self) -> Vec<PublicationJob> {
        let state = self.inner.state.lock().await;
        let mut jobs: Vec<_> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Adapter calls currently holding a slot
    pub async fn in_flight(&self) -> usize {
        self.inner.state.lock().await.running
    }

    /// Rebuild the cache from persisted `Queued` jobs.
    ///
    /// Run after interrupted jobs have been recovered.
    pub async fn restore(&self) -> Result<usize> {
        let queued = self.inner.store.load_queued_jobs().await?;
        let mut state = self.inner.state.lock().await;
        let mut restored = 0;
        for job in queued {
            if !self.inner.portals.contains(job.portal) {
                warn!(
                    job_id = %job.id,
                    portal = %job.portal,
                    "Portal not enabled, leaving job queued in storage"
                );
                continue;
            }
            state.cache(job);
            restored += 1;
        }
        drop(state);

        info!(restored = restored, "Queued jobs restored");
        self.inner.wakeup.notify_one();
        Ok(restored)
    }

    /// Dispatch loop. Returns after shutdown once in-flight attempts finish.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            global_concurrency = self.inner.config.global_limit(),
            per_portal_concurrency = self.inner.config.per_portal_concurrency,
            "Publication dispatcher started"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let (ready, next_due) = self.inner.dispatch_ready().await;
            for (job_id, portal) in ready {
                let inner = Arc::clone(&self.inner);
                in_flight.spawn(async move { inner.execute(job_id, portal).await });
            }

            let idle = self.inner.idle_wait(next_due);
            tokio::select! {
                _ = self.inner.wakeup.notified() => {}
                _ = tokio::time::sleep(idle) => {}
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Dispatch task aborted");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        info!(
            in_flight = in_flight.len(),
            "Dispatcher stopping, waiting for in-flight attempts"
        );
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Dispatch task aborted");
            }
        }
        info!("Publication dispatcher stopped");
    }

    /// Run the dispatch loop on its own task
    pub fn spawn(&self, shutdown: ShutdownToken) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move { queue.run(shutdown).await })
    }

    #[cfg(test)]
    async fn cached_state(&self, job_id: &str) -> Option<crate::domain::JobState> {
        self.inner.state.lock().await.jobs.get(job_id).map(|j| j.state)
    }
}

#[cfg(test)]
mod tests;
