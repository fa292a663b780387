//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC wire types of the daemon. Enumerations travel as
//! plain strings so the SDK does not break when the daemon learns a new
//! portal.

use serde::{Deserialize, Serialize};

/// Request to enqueue one publication job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub property_id: String,
    pub portal: String,
    /// publish (default), update or unpublish
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Epoch ms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<i64>,
}

impl EnqueueRequest {
    pub fn publish(property_id: impl Into<String>, portal: impl Into<String>) -> Self {
        Self {
            property_id: property_id.into(),
            portal: portal.into(),
            action: None,
            scheduled_for: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: String,
    pub message: String,
}

/// A publication job as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub property_id: String,
    pub portal: String,
    pub action: String,
    pub state: String,
    pub progress: u8,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub last_error: Option<JobError>,
    #[serde(default)]
    pub result_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub scheduled_for: Option<i64>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "PUBLISHED" | "FAILED" | "CANCELED")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JobsResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEventData {
    pub job_id: String,
    pub property_id: String,
    pub portal: String,
    pub status: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Live status channel event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// publication_update, publication_complete or publication_error
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StatusEventData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Bulk operation with its live summary. The operation body is kept as raw
/// JSON since its item shape depends on the operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStatus {
    pub operation: serde_json::Value,
    pub summary: BulkSummary,
}

impl BulkStatus {
    pub fn id(&self) -> Option<&str> {
        self.operation.get("id").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceAdjustment {
    pub amount: f64,
    /// percentage or fixed
    #[serde(rename = "type")]
    pub kind: String,
}
