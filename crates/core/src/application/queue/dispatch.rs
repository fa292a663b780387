// Job selection and attempt execution

use super::{QueueInner, QueueState};
use crate::application::retry::RetryDecision;
use crate::domain::{JobError, JobId, JobState, Portal, PublicationJob};
use crate::port::{AdapterError, ProgressReporter, PublishReceipt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

impl QueueInner {
    /// Move every due job that fits the concurrency limits to `Dispatching`.
    ///
    /// Due jobs are taken oldest first: `(due_at, created_at, id)`. Returns
    /// the selected jobs and the next future due time, if any.
    pub(super) async fn dispatch_ready(&self) -> (Vec<(JobId, Portal)>, Option<i64>) {
        let mut state = self.state.lock().await;
        let now = self.clock.now_millis();

        let mut due: Vec<(i64, i64, JobId, Portal)> = state
            .jobs
            .values()
            .filter(|job| job.is_due(now))
            .map(|job| (job.due_at(), job.created_at, job.id.clone(), job.portal))
            .collect();
        due.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));

        let next_due = state
            .jobs
            .values()
            .filter(|job| job.state == JobState::Queued && !job.is_due(now))
            .map(|job| job.due_at())
            .min();

        let mut selected = Vec::new();
        for (_, _, job_id, portal) in due {
            if state.running >= self.config.global_limit() {
                break;
            }
            if state.running_for(portal) >= self.config.limit_for(portal) {
                continue;
            }

            let Some(mut job) = state.jobs.get(&job_id).cloned() else {
                continue;
            };
            if let Err(e) = job.start_dispatch(now) {
                warn!(job_id = %job_id, error = %e, "Skipping job that cannot be dispatched");
                continue;
            }

            match self.commit(&mut state, job).await {
                Ok(()) => {
                    state.acquire(portal);
                    selected.push((job_id, portal));
                }
                Err(e) => {
                    // Store unavailable, try again on the next tick
                    error!(job_id = %job_id, error = %e, "Failed to persist dispatch");
                    break;
                }
            }
        }

        if !selected.is_empty() {
            debug!(
                selected = selected.len(),
                running = state.running,
                "Jobs dispatched"
            );
        }
        (selected, next_due)
    }

    /// How long the loop may sleep before the next scheduled job is due
    pub(super) fn idle_wait(&self, next_due: Option<i64>) -> Duration {
        let poll = self.config.poll_interval;
        match next_due {
            Some(due) => {
                let wait = (due - self.clock.now_millis()).max(0) as u64;
                Duration::from_millis(wait).min(poll)
            }
            None => poll,
        }
    }

    /// One attempt for a dispatched job. Always releases its slot.
    pub(super) async fn execute(self: Arc<Self>, job_id: JobId, portal: Portal) {
        if let Some(job) = self.begin(&job_id).await {
            let outcome = self.call_adapter(&job).await;
            self.finish(&job_id, outcome).await;
        }

        self.state.lock().await.release(portal);
        self.wakeup.notify_one();
    }

    /// Dispatching -> Publishing
    async fn begin(&self, job_id: &str) -> Option<PublicationJob> {
        let mut state = self.state.lock().await;
        let mut job = match state.jobs.get(job_id) {
            Some(job) if job.state == JobState::Dispatching => job.clone(),
            // canceled while waiting for its slot
            _ => {
                debug!(job_id = %job_id, "Job no longer dispatching, skipping");
                return None;
            }
        };

        let now = self.clock.now_millis();
        if let Err(e) = job.start_publishing(now) {
            warn!(job_id = %job_id, error = %e, "Cannot start publishing");
            return None;
        }

        match self.commit(&mut state, job.clone()).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    property_id = %job.property_id,
                    portal = %job.portal,
                    attempt = job.attempt,
                    "Publishing"
                );
                Some(job)
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to persist publishing state");
                self.requeue_in_cache(&mut state, job_id, now);
                None
            }
        }
    }

    async fn call_adapter(&self, job: &PublicationJob) -> Result<PublishReceipt, AdapterError> {
        let property = match self.catalog.get_property(&job.property_id).await {
            Ok(Some(property)) => property,
            Ok(None) => {
                return Err(AdapterError::Permanent(format!(
                    "property {} not found",
                    job.property_id
                )))
            }
            Err(e) => {
                return Err(AdapterError::Retryable(format!(
                    "property lookup failed: {}",
                    e
                )))
            }
        };
        let Some((adapter, settings)) = self.portals.get(job.portal) else {
            return Err(AdapterError::Permanent(format!(
                "portal {} is not enabled",
                job.portal
            )));
        };

        let (reporter, mut progress) = ProgressReporter::channel();
        let action = job.action;
        // Separate task: a panicking adapter only fails this attempt
        let mut call = tokio::spawn(async move {
            adapter
                .execute(action, &property, &settings, reporter)
                .await
        });
        let deadline = tokio::time::sleep(self.config.adapter_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                Some(value) = progress.recv() => self.apply_progress(&job.id, value).await,
                joined = &mut call => {
                    return match joined {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => Err(AdapterError::Permanent(format!(
                            "adapter panicked: {}",
                            panic_message(e)
                        ))),
                        Err(e) => Err(AdapterError::Permanent(format!(
                            "adapter task aborted: {}",
                            e
                        ))),
                    };
                }
                _ = &mut deadline => {
                    call.abort();
                    return Err(AdapterError::Timeout(format!(
                        "no response from {} within {}ms",
                        job.portal,
                        self.config.adapter_timeout.as_millis()
                    )));
                }
            }
        }
    }

    async fn apply_progress(&self, job_id: &str, value: i64) {
        let mut state = self.state.lock().await;
        let Some(mut job) = state.jobs.get(job_id).cloned() else {
            return;
        };
        match job.record_progress(value, self.clock.now_millis()) {
            Ok(true) => {
                if let Err(e) = self.commit(&mut state, job).await {
                    warn!(job_id = %job_id, error = %e, "Failed to persist progress");
                }
            }
            Ok(false) => {}
            Err(e) => debug!(job_id = %job_id, error = %e, "Progress update ignored"),
        }
    }

    /// Publishing -> Published | Queued (retry) | Failed
    async fn finish(&self, job_id: &str, outcome: Result<PublishReceipt, AdapterError>) {
        let mut state = self.state.lock().await;
        let Some(mut job) = state.jobs.get(job_id).cloned() else {
            warn!(job_id = %job_id, "Finished job missing from cache");
            return;
        };
        let now = self.clock.now_millis();

        let transition = match outcome {
            Ok(receipt) => {
                info!(
                    job_id = %job.id,
                    portal = %job.portal,
                    attempt = job.attempt,
                    url = %receipt.url,
                    "Publication succeeded"
                );
                job.complete(receipt.url, now)
            }
            Err(err) => {
                let kind = err.kind();
                let error = JobError::new(kind, err.message());
                match self.config.retry.decide(&job, kind) {
                    RetryDecision::Retry(delay_ms) => {
                        warn!(
                            job_id = %job.id,
                            portal = %job.portal,
                            attempt = job.attempt,
                            error = %err,
                            "Attempt failed, retry scheduled"
                        );
                        job.requeue_for_retry(error, now + delay_ms, now)
                    }
                    RetryDecision::Fail => {
                        error!(
                            job_id = %job.id,
                            portal = %job.portal,
                            attempt = job.attempt,
                            error = %err,
                            "Publication failed"
                        );
                        job.fail(error, now)
                    }
                }
            }
        };

        if let Err(e) = transition {
            error!(job_id = %job_id, error = %e, "Invalid transition after attempt");
            return;
        }
        if let Err(e) = self.commit(&mut state, job).await {
            error!(job_id = %job_id, error = %e, "Failed to persist attempt outcome");
            self.requeue_in_cache(&mut state, job_id, now);
        }
    }

    /// Put a job back in line after its transition could not be persisted.
    ///
    /// Cache only: the store still holds the last persisted state, which
    /// startup recovery treats as interrupted.
    fn requeue_in_cache(&self, state: &mut QueueState, job_id: &str, now: i64) {
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.state = JobState::Queued;
            job.scheduled_for = Some(now + self.config.poll_interval.as_millis() as i64);
            job.updated_at = now;
        }
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
