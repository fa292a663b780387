// StatusChannel wire events

use crate::domain::job::{JobId, JobState, PublicationJob};
use crate::domain::portal::Portal;
use crate::domain::property::PropertyId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEventKind {
    PublicationUpdate,
    PublicationComplete,
    PublicationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEventData {
    pub job_id: JobId,
    pub property_id: PropertyId,
    pub portal: Portal,
    pub status: JobState,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `{type, data}` event pushed to subscribers of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    pub kind: StatusEventKind,
    pub data: StatusEventData,
}

impl StatusEvent {
    /// Snapshot of a job right after a persisted transition
    pub fn from_job(job: &PublicationJob) -> Self {
        let kind = match job.state {
            JobState::Published => StatusEventKind::PublicationComplete,
            JobState::Failed => StatusEventKind::PublicationError,
            _ => StatusEventKind::PublicationUpdate,
        };

        let progress = match job.state {
            JobState::Publishing | JobState::Published => Some(job.progress),
            _ => None,
        };

        // A queued job with an error is waiting for its retry
        let message = match job.state {
            JobState::Failed | JobState::Queued => {
                job.last_error.as_ref().map(|e| e.message.clone())
            }
            _ => None,
        };

        Self {
            kind,
            data: StatusEventData {
                job_id: job.id.clone(),
                property_id: job.property_id.clone(),
                portal: job.portal,
                status: job.state,
                attempt: job.attempt,
                progress,
                message,
                url: job.result_url.clone(),
            },
        }
    }

    pub fn property_id(&self) -> &str {
        &self.data.property_id
    }
}
