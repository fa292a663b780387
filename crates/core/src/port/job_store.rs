// Job Store Port (persistence collaborator)
//
// The store is the single source of truth for job state. The queue keeps an
// in-memory cache of active jobs that must be rebuildable from here.

use crate::domain::{JobId, PublicationJob};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or overwrite a job record
    async fn save_job(&self, job: &PublicationJob) -> Result<()>;

    /// Find job by ID
    async fn load_job(&self, id: &JobId) -> Result<Option<PublicationJob>>;

    /// Non-terminal jobs for one property
    async fn load_active_jobs_for_property(&self, property_id: &str)
        -> Result<Vec<PublicationJob>>;

    /// All jobs for one property, oldest first (reconciliation)
    async fn load_jobs_for_property(&self, property_id: &str) -> Result<Vec<PublicationJob>>;

    /// Jobs left `Dispatching`/`Publishing` (startup recovery)
    async fn load_interrupted_jobs(&self) -> Result<Vec<PublicationJob>>;

    /// Jobs waiting in `Queued` (cache rebuild)
    async fn load_queued_jobs(&self) -> Result<Vec<PublicationJob>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::JobState;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// HashMap-backed store that also records every save in order
    #[derive(Default)]
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<JobId, PublicationJob>>,
        history: Mutex<Vec<(JobId, JobState, u8)>>,
        fail_saves: AtomicBool,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent `save_job` fail with a database error
        pub fn set_fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }

        /// Every persisted (job, state, progress) triple in save order
        pub fn history(&self) -> Vec<(JobId, JobState, u8)> {
            self.history.lock().unwrap().clone()
        }

        pub fn states_of(&self, job_id: &str) -> Vec<JobState> {
            self.history()
                .into_iter()
                .filter(|(id, _, _)| id == job_id)
                .map(|(_, state, _)| state)
                .collect()
        }

        pub fn all_jobs(&self) -> Vec<PublicationJob> {
            let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            jobs
        }

        fn filtered(&self, pred: impl Fn(&PublicationJob) -> bool) -> Vec<PublicationJob> {
            self.all_jobs().into_iter().filter(|j| pred(j)).collect()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn save_job(&self, job: &PublicationJob) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AppError::Database("store unavailable".to_string()));
            }
            self.history
                .lock()
                .unwrap()
                .push((job.id.clone(), job.state, job.progress));
            self.jobs
                .lock()
                .unwrap()
                .insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn load_job(&self, id: &JobId) -> Result<Option<PublicationJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn load_active_jobs_for_property(
            &self,
            property_id: &str,
        ) -> Result<Vec<PublicationJob>> {
            Ok(self.filtered(|j| j.property_id == property_id && j.is_active()))
        }

        async fn load_jobs_for_property(&self, property_id: &str) -> Result<Vec<PublicationJob>> {
            Ok(self.filtered(|j| j.property_id == property_id))
        }

        async fn load_interrupted_jobs(&self) -> Result<Vec<PublicationJob>> {
            Ok(self.filtered(|j| {
                matches!(j.state, JobState::Dispatching | JobState::Publishing)
            }))
        }

        async fn load_queued_jobs(&self) -> Result<Vec<PublicationJob>> {
            Ok(self.filtered(|j| j.state == JobState::Queued))
        }
    }
}
