//! RPC Method Handlers
//!
//! Thin translation between wire types and the publication services.

use crate::error::to_rpc_error;
use crate::types::{
    BulkPriceUpdateRequest, BulkPublishRequest, BulkScheduleRequest, BulkStatusRequest,
    EnqueueRequest, JobRequest, JobsResponse, PropertiesRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use realty_core::application::{
    BulkOperationCoordinator, BulkStatus, EnqueueOptions, PublicationQueue, StatusSubscription,
};
use realty_core::domain::{
    AdjustmentType, Portal, PriceAdjustment, PropertyId, PublicationAction, PublicationJob,
};
use realty_core::error::AppError;
use std::sync::Arc;
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected services
pub struct RpcHandler {
    queue: PublicationQueue,
    bulk: Arc<BulkOperationCoordinator>,
}

impl RpcHandler {
    pub fn new(queue: PublicationQueue, bulk: Arc<BulkOperationCoordinator>) -> Self {
        Self { queue, bulk }
    }

    /// publication.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> RpcResult<PublicationJob> {
        let portal = parse_portal(&params.portal)?;
        let action = match params.action.as_deref() {
            Some(action) => action
                .parse::<PublicationAction>()
                .map_err(|e| to_rpc_error(e.into()))?,
            None => PublicationAction::Publish,
        };
        let options = EnqueueOptions {
            action,
            scheduled_for: params.scheduled_for,
        };

        self.queue
            .enqueue(&params.property_id, portal, options)
            .await
            .map_err(to_rpc_error)
    }

    /// publication.cancel.v1
    pub async fn cancel(&self, params: JobRequest) -> RpcResult<PublicationJob> {
        self.queue.cancel(&params.job_id).await.map_err(to_rpc_error)
    }

    /// publication.job.v1
    pub async fn job(&self, params: JobRequest) -> RpcResult<PublicationJob> {
        self.queue
            .job(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Job {} not found", params.job_id)))
            })
    }

    /// publication.jobs.v1: latest job per (property, portal), used for
    /// reconciliation after every (re)connect
    pub async fn jobs(&self, params: PropertiesRequest) -> RpcResult<JobsResponse> {
        let property_ids = non_empty_properties(params.property_ids)?;
        let jobs = self
            .queue
            .current_jobs(&property_ids)
            .await
            .map_err(to_rpc_error)?;
        Ok(JobsResponse { jobs })
    }

    /// bulk.publish.v1
    pub async fn bulk_publish(&self, params: BulkPublishRequest) -> RpcResult<BulkStatus> {
        let portals = parse_portals(&params.portals)?;
        let operation = self
            .bulk
            .publish(&params.property_ids, &portals)
            .await
            .map_err(to_rpc_error)?;
        self.with_summary(operation.id).await
    }

    /// bulk.schedule.v1
    pub async fn bulk_schedule(&self, params: BulkScheduleRequest) -> RpcResult<BulkStatus> {
        let portals = parse_portals(&params.portals)?;
        let operation = self
            .bulk
            .schedule(&params.property_ids, params.when, &portals)
            .await
            .map_err(to_rpc_error)?;
        self.with_summary(operation.id).await
    }

    /// bulk.price_update.v1
    pub async fn bulk_price_update(
        &self,
        params: BulkPriceUpdateRequest,
    ) -> RpcResult<BulkStatus> {
        let kind: AdjustmentType = params
            .adjustment
            .kind
            .parse()
            .map_err(|e: realty_core::domain::DomainError| to_rpc_error(e.into()))?;
        let adjustment = PriceAdjustment::new(params.adjustment.amount, kind)
            .map_err(|e| to_rpc_error(e.into()))?;

        let operation = self
            .bulk
            .price_update(&params.property_ids, adjustment)
            .await
            .map_err(to_rpc_error)?;
        self.with_summary(operation.id).await
    }

    /// bulk.status.v1
    pub async fn bulk_status(&self, params: BulkStatusRequest) -> RpcResult<BulkStatus> {
        self.bulk
            .status(&params.bulk_id)
            .await
            .map_err(to_rpc_error)
    }

    /// Open a filtered view of the status hub for publication.subscribe.v1
    pub fn subscribe(&self, params: PropertiesRequest) -> RpcResult<StatusSubscription> {
        let property_ids = non_empty_properties(params.property_ids)?;
        debug!(properties = property_ids.len(), "Opening status subscription");
        Ok(self.queue.subscribe(&property_ids))
    }

    async fn with_summary(&self, bulk_id: String) -> RpcResult<BulkStatus> {
        self.bulk.status(&bulk_id).await.map_err(to_rpc_error)
    }
}

fn parse_portal(name: &str) -> RpcResult<Portal> {
    name.parse::<Portal>().map_err(|e| to_rpc_error(e.into()))
}

fn parse_portals(names: &[String]) -> RpcResult<Vec<Portal>> {
    names.iter().map(|name| parse_portal(name)).collect()
}

fn non_empty_properties(ids: Vec<String>) -> RpcResult<Vec<PropertyId>> {
    let ids: Vec<PropertyId> = ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(to_rpc_error(AppError::Validation(
            "at least one property id is required".to_string(),
        )));
    }
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::code;
    use realty_core::application::{QueueConfig, StatusHub};
    use realty_core::domain::{JobState, PortalSettings};
    use realty_core::port::bulk_store::mocks::InMemoryBulkStore;
    use realty_core::port::id_provider::SequenceIdProvider;
    use realty_core::port::job_store::mocks::InMemoryJobStore;
    use realty_core::port::portal_adapter::mocks::ScriptedPortalAdapter;
    use realty_core::port::property_catalog::mocks::InMemoryPropertyCatalog;
    use realty_core::port::time_provider::ManualClock;
    use realty_core::port::PortalRegistry;

    /// Handler over in-memory stores; no dispatcher runs, so jobs stay queued
    pub(crate) fn handler() -> RpcHandler {
        let jobs = Arc::new(InMemoryJobStore::new());
        let catalog = Arc::new(InMemoryPropertyCatalog::with_properties(
            &["p1", "p2"],
            200_000.0,
        ));
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = PortalRegistry::new()
            .with(
                Arc::new(ScriptedPortalAdapter::new(Portal::Idealista)),
                PortalSettings::default(),
            )
            .with(
                Arc::new(ScriptedPortalAdapter::new(Portal::Fotocasa)),
                PortalSettings::default(),
            );
        let queue = PublicationQueue::new(
            QueueConfig::default(),
            jobs.clone(),
            catalog.clone(),
            registry,
            StatusHub::new(),
            Arc::new(SequenceIdProvider::new("job")),
            clock.clone(),
        );
        let bulk = BulkOperationCoordinator::new(
            queue.clone(),
            catalog,
            jobs,
            Arc::new(InMemoryBulkStore::new()),
            Arc::new(SequenceIdProvider::new("bulk")),
            clock,
        );
        RpcHandler::new(queue, Arc::new(bulk))
    }

    fn enqueue_request(property_id: &str, portal: &str) -> EnqueueRequest {
        EnqueueRequest {
            property_id: property_id.into(),
            portal: portal.into(),
            action: None,
            scheduled_for: None,
        }
    }

    #[tokio::test]
    async fn test_enqueue_parses_portal_case_insensitively() {
        let handler = handler();
        let job = handler
            .enqueue(enqueue_request("p1", "Idealista"))
            .await
            .unwrap();
        assert_eq!(job.portal, Portal::Idealista);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.action, PublicationAction::Publish);
    }

    #[tokio::test]
    async fn test_unknown_portal_is_validation_error() {
        let handler = handler();
        let err = handler
            .enqueue(enqueue_request("p1", "craigslist"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_conflict() {
        let handler = handler();
        handler.enqueue(enqueue_request("p1", "fotocasa")).await.unwrap();
        let err = handler
            .enqueue(enqueue_request("p1", "fotocasa"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_then_lookup() {
        let handler = handler();
        let job = handler.enqueue(enqueue_request("p1", "idealista")).await.unwrap();

        let canceled = handler
            .cancel(JobRequest { job_id: job.id.clone() })
            .await
            .unwrap();
        assert_eq!(canceled.state, JobState::Canceled);

        let err = handler
            .cancel(JobRequest { job_id: job.id.clone() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_CANCELABLE);

        let found = handler.job(JobRequest { job_id: job.id }).await.unwrap();
        assert_eq!(found.state, JobState::Canceled);

        let missing = handler
            .job(JobRequest {
                job_id: "nope".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(missing.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_jobs_requires_properties() {
        let handler = handler();
        let err = handler
            .jobs(PropertiesRequest {
                property_ids: vec!["  ".into()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_bulk_publish_returns_summary() {
        let handler = handler();
        handler.enqueue(enqueue_request("p1", "idealista")).await.unwrap();

        let status = handler
            .bulk_publish(BulkPublishRequest {
                property_ids: vec!["p1".into(), "p2".into()],
                portals: vec!["idealista".into(), "fotocasa".into()],
            })
            .await
            .unwrap();
        assert_eq!(status.operation.job_ids().len(), 3);
        assert_eq!(status.summary.pending, 3);
    }

    #[tokio::test]
    async fn test_bulk_price_update_rejects_unknown_adjustment() {
        let handler = handler();
        let err = handler
            .bulk_price_update(BulkPriceUpdateRequest {
                property_ids: vec!["p1".into()],
                adjustment: crate::types::AdjustmentParams {
                    amount: 5.0,
                    kind: "double".into(),
                },
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }
}
