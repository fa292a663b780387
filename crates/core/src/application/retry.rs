// Retry logic for failed adapter attempts
use crate::domain::{ErrorKind, PublicationJob};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::queue::constants::{
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_JITTER, DEFAULT_RETRY_MAX_DELAY_MS,
};
use crate::domain::job::DEFAULT_MAX_ATTEMPTS;

/// Exponential backoff: `min(base * 2^exponent, cap)`.
///
/// Pure so both the dispatcher and clients can test it in isolation.
pub fn exponential_backoff(base: Duration, exponent: u32, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue the job after this many milliseconds
    Retry(i64),
    /// Do not retry, the job fails permanently
    Fail,
}

/// Retry policy
///
/// Determines if a failed attempt should be retried based on:
/// - The failure kind (only `Retryable` and `Timeout` are retried)
/// - The attempt count versus the job's maximum
/// - Exponential backoff with jitter for the delay
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Relative jitter, 0.1 = +/-10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: DEFAULT_RETRY_JITTER,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the next try, after `attempt` attempts have failed.
    ///
    /// `min(base * 2^(attempt-1), max)`, then +/- jitter, never above `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = exponential_backoff(
            self.base_delay,
            attempt.saturating_sub(1),
            self.max_delay,
        );
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor).min(self.max_delay)
    }

    /// Decide what happens to a job whose current attempt just failed.
    ///
    /// `job.attempt` already counts the failed attempt.
    pub fn decide(&self, job: &PublicationJob, kind: ErrorKind) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::Fail;
        }

        let max_attempts = job.max_attempts.min(self.max_attempts).max(1);
        if job.attempt >= max_attempts {
            warn!(
                job_id = %job.id,
                attempt = job.attempt,
                max_attempts = max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Fail;
        }

        let delay_ms = self.delay_for(job.attempt).as_millis() as i64;
        info!(
            job_id = %job.id,
            attempt = job.attempt,
            max_attempts = max_attempts,
            delay_ms = delay_ms,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay_ms)
    }
}
