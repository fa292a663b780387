// Startup recovery of jobs interrupted mid-attempt
use crate::domain::{ErrorKind, JobError, JobState};
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// A job persisted as `Dispatching` or `Publishing` when the process died
/// has an unknown outcome at the portal. On startup every such job goes back
/// to `Queued` with its attempt count intact, before the queue restores its
/// cache. A job cut off during its last allowed attempt is failed instead, so
/// no job ever makes more than `max_attempts` adapter calls.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Re-queue interrupted jobs, or fail those with no attempts left.
    ///
    /// # Returns
    /// Number of jobs recovered (re-queued or failed)
    pub async fn recover_interrupted_jobs(&self) -> crate::error::Result<usize> {
        let interrupted = self.store.load_interrupted_jobs().await?;
        if interrupted.is_empty() {
            return Ok(0);
        }

        let now = self.time_provider.now_millis();
        let mut recovered = 0;
        for mut job in interrupted {
            let previous = job.state;
            if previous == JobState::Publishing && job.attempt >= job.max_attempts {
                let error = JobError::new(
                    ErrorKind::Retryable,
                    "interrupted by restart during the final attempt",
                );
                if let Err(e) = job.fail(error, now) {
                    warn!(job_id = %job.id, error = %e, "Skipping unrecoverable job");
                    continue;
                }
                self.store.save_job(&job).await?;
                warn!(
                    job_id = %job.id,
                    portal = %job.portal,
                    attempt = job.attempt,
                    "Interrupted job had no attempts left, marked failed"
                );
                recovered += 1;
                continue;
            }
            if let Err(e) = job.interrupt(now) {
                warn!(job_id = %job.id, error = %e, "Skipping unrecoverable job");
                continue;
            }
            self.store.save_job(&job).await?;
            info!(
                job_id = %job.id,
                portal = %job.portal,
                previous_state = %previous,
                attempt = job.attempt,
                "Interrupted job re-queued"
            );
            recovered += 1;
        }

        info!(recovered = recovered, "Interrupted job recovery complete");
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, JobState, Portal, PublicationAction, PublicationJob};
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::ManualClock;

    fn job(id: &str, state: JobState) -> PublicationJob {
        let mut job = PublicationJob::new(id, 1_000, "p1", Portal::Fotocasa, PublicationAction::Publish);
        if matches!(state, JobState::Dispatching | JobState::Publishing) {
            job.start_dispatch(1_100).unwrap();
        }
        if state == JobState::Publishing {
            job.start_publishing(1_200).unwrap();
        }
        job.state = state;
        job
    }

    #[tokio::test]
    async fn test_recovers_dispatching_and_publishing_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        store.save_job(&job("dispatching", JobState::Dispatching)).await.unwrap();
        store.save_job(&job("publishing", JobState::Publishing)).await.unwrap();
        store.save_job(&job("queued", JobState::Queued)).await.unwrap();
        store.save_job(&job("published", JobState::Published)).await.unwrap();

        let recovery = RecoveryService::new(store.clone(), Arc::new(ManualClock::new(50_000)));
        assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 2);

        let publishing = store.load_job(&"publishing".to_string()).await.unwrap().unwrap();
        assert_eq!(publishing.state, JobState::Queued);
        assert_eq!(publishing.attempt, 1);
        assert_eq!(publishing.updated_at, 50_000);
        assert_eq!(
            publishing.last_error.map(|e| e.kind),
            Some(ErrorKind::Retryable)
        );

        let published = store.load_job(&"published".to_string()).await.unwrap().unwrap();
        assert_eq!(published.state, JobState::Published);

        // second run finds nothing
        assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_job_interrupted_on_final_attempt_is_failed() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut last = job("last", JobState::Publishing);
        last.attempt = last.max_attempts;
        store.save_job(&last).await.unwrap();
        let mut dispatching = job("dispatching", JobState::Dispatching);
        dispatching.attempt = dispatching.max_attempts - 1;
        store.save_job(&dispatching).await.unwrap();

        let recovery = RecoveryService::new(store.clone(), Arc::new(ManualClock::new(60_000)));
        assert_eq!(recovery.recover_interrupted_jobs().await.unwrap(), 2);

        let failed = store.load_job(&"last".to_string()).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.attempt, failed.max_attempts);
        assert!(failed.is_terminal());
        assert_eq!(failed.last_error.map(|e| e.kind), Some(ErrorKind::Retryable));

        // not yet at the adapter, so the attempt was never spent
        let requeued = store.load_job(&"dispatching".to_string()).await.unwrap().unwrap();
        assert_eq!(requeued.state, JobState::Queued);
    }
}
