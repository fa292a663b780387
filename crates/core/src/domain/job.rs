// PublicationJob Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::portal::Portal;
use crate::domain::property::PropertyId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Publication job lifecycle.
///
/// `Published`, `Failed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Dispatching,
    Publishing,
    Published,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Published | JobState::Failed | JobState::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Dispatching => "DISPATCHING",
            JobState::Publishing => "PUBLISHING",
            JobState::Published => "PUBLISHED",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(JobState::Queued),
            "DISPATCHING" => Ok(JobState::Dispatching),
            "PUBLISHING" => Ok(JobState::Publishing),
            "PUBLISHED" => Ok(JobState::Published),
            "FAILED" => Ok(JobState::Failed),
            "CANCELED" => Ok(JobState::Canceled),
            other => Err(DomainError::Validation(format!(
                "unknown job state: {}",
                other
            ))),
        }
    }
}

/// What the adapter is asked to do at the portal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationAction {
    #[default]
    Publish,
    Update,
    Unpublish,
}

impl PublicationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationAction::Publish => "publish",
            PublicationAction::Update => "update",
            PublicationAction::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for PublicationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationAction {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publish" => Ok(PublicationAction::Publish),
            "update" => Ok(PublicationAction::Update),
            "unpublish" => Ok(PublicationAction::Unpublish),
            other => Err(DomainError::Validation(format!(
                "unknown publication action: {}",
                other
            ))),
        }
    }
}

/// Failure classification governing whether another attempt is made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Retryable,
    Permanent,
    Timeout,
}

impl ErrorKind {
    /// `Timeout` is retried like any other transient failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Retryable => "retryable",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "retryable" => Ok(ErrorKind::Retryable),
            "permanent" => Ok(ErrorKind::Permanent),
            "timeout" => Ok(ErrorKind::Timeout),
            other => Err(DomainError::Validation(format!(
                "unknown error kind: {}",
                other
            ))),
        }
    }
}

/// Structured error from the most recent failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Default number of dispatch attempts before a job fails
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One (property, portal) publication attempt with its lifecycle.
///
/// All timestamps are epoch milliseconds and are injected by the caller,
/// never read from the system clock here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationJob {
    pub id: JobId,
    pub property_id: PropertyId,
    pub portal: Portal,
    pub action: PublicationAction,
    pub state: JobState,
    pub progress: u8,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<JobError>,
    pub result_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub scheduled_for: Option<i64>,
}

impl PublicationJob {
    /// Create a new `Queued` job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `property_id` - Property being published
    /// * `portal` - Target portal
    /// * `action` - What the adapter should do
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        property_id: impl Into<String>,
        portal: Portal,
        action: PublicationAction,
    ) -> Self {
        Self {
            id: id.into(),
            property_id: property_id.into(),
            portal,
            action,
            state: JobState::Queued,
            progress: 0,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            last_error: None,
            result_url: None,
            created_at,
            updated_at: created_at,
            scheduled_for: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Time from which the job may be dispatched
    pub fn due_at(&self) -> i64 {
        self.scheduled_for.unwrap_or(self.created_at)
    }

    pub fn is_due(&self, now_millis: i64) -> bool {
        self.state == JobState::Queued && self.due_at() <= now_millis
    }

    fn invalid(&self, to: JobState) -> DomainError {
        DomainError::InvalidTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    /// Queued -> Dispatching: selected by the dispatcher
    pub fn start_dispatch(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Queued {
            return Err(self.invalid(JobState::Dispatching));
        }
        self.state = JobState::Dispatching;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Dispatching -> Publishing: adapter call started
    pub fn start_publishing(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Dispatching {
            return Err(self.invalid(JobState::Publishing));
        }
        self.state = JobState::Publishing;
        self.attempt += 1;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Record an intermediate progress value reported by the adapter.
    ///
    /// Values are clamped to 0..=100. Returns `Ok(false)` when the value
    /// equals the current one (nothing to forward).
    pub fn record_progress(&mut self, value: i64, now_millis: i64) -> Result<bool> {
        if self.state != JobState::Publishing {
            return Err(DomainError::InvalidTransition {
                from: self.state.to_string(),
                to: "PROGRESS".to_string(),
            });
        }
        let clamped = value.clamp(0, 100) as u8;
        if clamped < self.progress {
            return Err(DomainError::ProgressRegression {
                job_id: self.id.clone(),
                current: self.progress,
                requested: clamped,
            });
        }
        if clamped == self.progress {
            return Ok(false);
        }
        self.progress = clamped;
        self.updated_at = now_millis;
        Ok(true)
    }

    /// Publishing -> Published (terminal)
    pub fn complete(&mut self, result_url: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.state != JobState::Publishing {
            return Err(self.invalid(JobState::Published));
        }
        self.state = JobState::Published;
        self.progress = 100;
        self.result_url = Some(result_url.into());
        self.updated_at = now_millis;
        Ok(())
    }

    /// Publishing -> Queued with a future due time
    pub fn requeue_for_retry(
        &mut self,
        error: JobError,
        retry_at: i64,
        now_millis: i64,
    ) -> Result<()> {
        if self.state != JobState::Publishing {
            return Err(self.invalid(JobState::Queued));
        }
        self.state = JobState::Queued;
        self.last_error = Some(error);
        self.scheduled_for = Some(retry_at);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Publishing -> Failed (terminal)
    pub fn fail(&mut self, error: JobError, now_millis: i64) -> Result<()> {
        if self.state != JobState::Publishing {
            return Err(self.invalid(JobState::Failed));
        }
        self.state = JobState::Failed;
        self.last_error = Some(error);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Queued/Dispatching -> Canceled (terminal)
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        if !matches!(self.state, JobState::Queued | JobState::Dispatching) {
            return Err(self.invalid(JobState::Canceled));
        }
        self.state = JobState::Canceled;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Dispatching/Publishing -> Queued after a restart left the outcome unknown
    pub fn interrupt(&mut self, now_millis: i64) -> Result<()> {
        if !matches!(self.state, JobState::Dispatching | JobState::Publishing) {
            return Err(self.invalid(JobState::Queued));
        }
        self.state = JobState::Queued;
        self.last_error = Some(JobError::new(
            ErrorKind::Retryable,
            "interrupted by restart",
        ));
        self.scheduled_for = None;
        self.updated_at = now_millis;
        Ok(())
    }
}
