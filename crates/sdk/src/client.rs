//! Realty Publisher request API client

use crate::error::Result;
use crate::types::{BulkStatus, EnqueueRequest, Job, JobsResponse, PriceAdjustment};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

use crate::error::SdkError;

/// Client for the daemon's request/response API.
///
/// # Example
///
/// ```no_run
/// use realty_sdk::{EnqueueRequest, RealtyClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtyClient::connect("http://127.0.0.1:9630").await?;
/// let job = client.enqueue(EnqueueRequest::publish("prop-1", "idealista")).await?;
/// println!("{} is {}", job.id, job.state);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtyClient {
    client: HttpClient,
}

impl RealtyClient {
    /// Connect to the daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9630`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: ObjectParams) -> Result<T> {
        Ok(self.client.request(method, params).await?)
    }

    /// Enqueue one (property, portal) job
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Job> {
        self.call("publication.enqueue.v1", object_params(&request)?)
            .await
    }

    /// Cancel a job that has not reached its portal yet
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        self.call("publication.cancel.v1", object_params(&json!({ "jobId": job_id }))?)
            .await
    }

    pub async fn job(&self, job_id: &str) -> Result<Job> {
        self.call("publication.job.v1", object_params(&json!({ "jobId": job_id }))?)
            .await
    }

    /// Latest job per (property, portal) for the given properties.
    ///
    /// This is the reconciliation snapshot; it never goes through the live
    /// channel.
    pub async fn current_jobs(&self, property_ids: &[String]) -> Result<Vec<Job>> {
        let response: JobsResponse = self
            .call(
                "publication.jobs.v1",
                object_params(&json!({ "propertyIds": property_ids }))?,
            )
            .await?;
        Ok(response.jobs)
    }

    pub async fn bulk_publish(
        &self,
        property_ids: &[String],
        portals: &[String],
    ) -> Result<BulkStatus> {
        self.call(
            "bulk.publish.v1",
            object_params(&json!({ "propertyIds": property_ids, "portals": portals }))?,
        )
        .await
    }

    /// Bulk publish with every job due at `when` (epoch ms)
    pub async fn bulk_schedule(
        &self,
        property_ids: &[String],
        portals: &[String],
        when: i64,
    ) -> Result<BulkStatus> {
        self.call(
            "bulk.schedule.v1",
            object_params(&json!({
                "propertyIds": property_ids,
                "portals": portals,
                "when": when,
            }))?,
        )
        .await
    }

    pub async fn bulk_price_update(
        &self,
        property_ids: &[String],
        adjustment: PriceAdjustment,
    ) -> Result<BulkStatus> {
        self.call(
            "bulk.price_update.v1",
            object_params(&json!({
                "propertyIds": property_ids,
                "adjustment": adjustment,
            }))?,
        )
        .await
    }

    pub async fn bulk_status(&self, bulk_id: &str) -> Result<BulkStatus> {
        self.call("bulk.status.v1", object_params(&json!({ "bulkId": bulk_id }))?)
            .await
    }
}

/// Named JSON-RPC params from a serializable object
pub(crate) fn object_params<T: Serialize>(request: &T) -> Result<ObjectParams> {
    let mut params = ObjectParams::new();
    match serde_json::to_value(request)? {
        serde_json::Value::Object(fields) => {
            for (name, value) in fields {
                params.insert(&name, value)?;
            }
            Ok(params)
        }
        other => Err(SdkError::Other(format!(
            "request params must be an object, got {}",
            other
        ))),
    }
}
