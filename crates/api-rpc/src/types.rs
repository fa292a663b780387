//! RPC Request/Response Types
//!
//! Method parameters are named JSON objects with camelCase keys. Portals,
//! actions and adjustment types arrive as strings and are parsed
//! case-insensitively by the handler so that unknown names become
//! validation errors instead of generic parse failures.

use realty_core::domain::PublicationJob;
use serde::{Deserialize, Serialize};

/// publication.enqueue.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub property_id: String,
    pub portal: String,
    /// publish (default), update or unpublish
    #[serde(default)]
    pub action: Option<String>,
    /// Epoch ms; omitted means "as soon as possible"
    #[serde(default)]
    pub scheduled_for: Option<i64>,
}

/// publication.cancel.v1 / publication.job.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub job_id: String,
}

/// publication.jobs.v1 and publication.subscribe.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertiesRequest {
    pub property_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<PublicationJob>,
}

/// bulk.publish.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPublishRequest {
    pub property_ids: Vec<String>,
    pub portals: Vec<String>,
}

/// bulk.schedule.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScheduleRequest {
    pub property_ids: Vec<String>,
    pub portals: Vec<String>,
    /// Epoch ms
    pub when: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentParams {
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// bulk.price_update.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPriceUpdateRequest {
    pub property_ids: Vec<String>,
    pub adjustment: AdjustmentParams,
}

/// bulk.status.v1
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    pub bulk_id: String,
}
