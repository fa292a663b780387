// Bulk operations: one request expanded into many jobs or price mutations
use crate::application::queue::{EnqueueOptions, PublicationQueue};
use crate::domain::{
    BulkId, BulkItems, BulkKind, BulkOperation, BulkSummary, MutationOutcome, PairOutcome, Portal,
    PriceAdjustment, PriceMutation, PropertyId,
};
use crate::error::{AppError, Result};
use crate::port::{BulkOperationStore, IdProvider, JobStore, PropertyCatalog, TimeProvider};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Price mutations applied concurrently within one bulk request
const PRICE_UPDATE_CONCURRENCY: usize = 8;

/// Stored operation with its summary computed at read time
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatus {
    pub operation: BulkOperation,
    pub summary: BulkSummary,
}

pub struct BulkOperationCoordinator {
    queue: PublicationQueue,
    catalog: Arc<dyn PropertyCatalog>,
    jobs: Arc<dyn JobStore>,
    operations: Arc<dyn BulkOperationStore>,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn TimeProvider>,
}

impl BulkOperationCoordinator {
    pub fn new(
        queue: PublicationQueue,
        catalog: Arc<dyn PropertyCatalog>,
        jobs: Arc<dyn JobStore>,
        operations: Arc<dyn BulkOperationStore>,
        ids: Arc<dyn IdProvider>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            queue,
            catalog,
            jobs,
            operations,
            ids,
            clock,
        }
    }

    /// Enqueue every (property, portal) pair that has no active job
    pub async fn publish(
        &self,
        property_ids: &[PropertyId],
        portals: &[Portal],
    ) -> Result<BulkOperation> {
        self.spawn_jobs(BulkKind::Publish, property_ids, portals, EnqueueOptions::default())
            .await
    }

    /// Like `publish`, with every job due at `when` (epoch ms)
    pub async fn schedule(
        &self,
        property_ids: &[PropertyId],
        when: i64,
        portals: &[Portal],
    ) -> Result<BulkOperation> {
        self.spawn_jobs(
            BulkKind::Schedule,
            property_ids,
            portals,
            EnqueueOptions::scheduled(when),
        )
        .await
    }

    /// Apply a price adjustment to each property independently
    pub async fn price_update(
        &self,
        property_ids: &[PropertyId],
        adjustment: PriceAdjustment,
    ) -> Result<BulkOperation> {
        let property_ids = validate_properties(property_ids)?;
        PriceAdjustment::new(adjustment.amount, adjustment.kind)?;

        let mutations: Vec<PriceMutation> = stream::iter(property_ids)
            .map(|property_id| async move {
                let outcome = self.mutate_price(&property_id, adjustment).await;
                PriceMutation {
                    property_id,
                    outcome,
                }
            })
            .buffered(PRICE_UPDATE_CONCURRENCY)
            .collect()
            .await;

        let summary = BulkSummary::from_mutations(&mutations);
        let operation = BulkOperation {
            id: self.ids.generate_id(),
            kind: BulkKind::PriceUpdate,
            created_at: self.clock.now_millis(),
            items: BulkItems::PriceUpdates { mutations },
        };
        self.operations.save_bulk_operation(&operation).await?;

        info!(
            bulk_id = %operation.id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            amount = adjustment.amount,
            adjustment_type = ?adjustment.kind,
            "Bulk price update applied"
        );
        Ok(operation)
    }

    /// Summary derived from the current state of the constituents
    pub async fn summary(&self, operation: &BulkOperation) -> Result<BulkSummary> {
        match &operation.items {
            BulkItems::Jobs { job_ids, .. } => {
                let mut states = Vec::with_capacity(job_ids.len());
                for job_id in job_ids {
                    states.push(self.jobs.load_job(job_id).await?.map(|job| job.state));
                }
                Ok(BulkSummary::from_job_states(states))
            }
            BulkItems::PriceUpdates { mutations } => Ok(BulkSummary::from_mutations(mutations)),
        }
    }

    pub async fn status(&self, bulk_id: &str) -> Result<BulkStatus> {
        let operation = self
            .operations
            .load_bulk_operation(&bulk_id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bulk operation {} not found", bulk_id)))?;
        let summary = self.summary(&operation).await?;
        Ok(BulkStatus { operation, summary })
    }

    async fn spawn_jobs(
        &self,
        kind: BulkKind,
        property_ids: &[PropertyId],
        portals: &[Portal],
        options: EnqueueOptions,
    ) -> Result<BulkOperation> {
        let property_ids = validate_properties(property_ids)?;
        let portals = self.validate_portals(portals)?;
        let id: BulkId = self.ids.generate_id();

        let mut job_ids = Vec::new();
        let mut skipped = Vec::new();
        let mut rejected = Vec::new();
        for property_id in &property_ids {
            for &portal in &portals {
                match self.queue.enqueue(property_id, portal, options).await {
                    Ok(job) => job_ids.push(job.id),
                    Err(AppError::DuplicateActiveJob {
                        existing_job_id, ..
                    }) => skipped.push(PairOutcome {
                        property_id: property_id.clone(),
                        portal,
                        reason: format!("active job {} already exists", existing_job_id),
                    }),
                    Err(e) => {
                        warn!(
                            bulk_id = %id,
                            property_id = %property_id,
                            portal = %portal,
                            error = %e,
                            "Bulk pair rejected"
                        );
                        rejected.push(PairOutcome {
                            property_id: property_id.clone(),
                            portal,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            bulk_id = %id,
            kind = %kind.as_str(),
            spawned = job_ids.len(),
            skipped = skipped.len(),
            rejected = rejected.len(),
            "Bulk operation created"
        );

        let operation = BulkOperation {
            id,
            kind,
            created_at: self.clock.now_millis(),
            items: BulkItems::Jobs {
                job_ids,
                skipped,
                rejected,
            },
        };
        self.operations.save_bulk_operation(&operation).await?;
        Ok(operation)
    }

    async fn mutate_price(&self, property_id: &str, adjustment: PriceAdjustment) -> MutationOutcome {
        let property = match self.catalog.get_property(property_id).await {
            Ok(Some(property)) => property,
            Ok(None) => {
                return MutationOutcome::Failed {
                    message: format!("property {} not found", property_id),
                }
            }
            Err(e) => {
                return MutationOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        let new_price = adjustment.apply(property.price);
        match self.catalog.update_price(property_id, new_price).await {
            Ok(()) => MutationOutcome::Applied {
                old_price: property.price,
                new_price,
            },
            Err(e) => {
                warn!(property_id = %property_id, error = %e, "Price update failed");
                MutationOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    fn validate_portals(&self, portals: &[Portal]) -> Result<Vec<Portal>> {
        if portals.is_empty() {
            return Err(AppError::Validation("portals must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for &portal in portals {
            if !self.queue.supports(portal) {
                return Err(AppError::Validation(format!(
                    "portal {} is not enabled",
                    portal
                )));
            }
            if seen.insert(portal) {
                unique.push(portal);
            }
        }
        Ok(unique)
    }
}

/// Non-empty, trimmed, de-duplicated, request order kept
fn validate_properties(property_ids: &[PropertyId]) -> Result<Vec<PropertyId>> {
    if property_ids.is_empty() {
        return Err(AppError::Validation(
            "propertyIds must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for id in property_ids {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::Validation(
                "propertyIds must not contain blank ids".to_string(),
            ));
        }
        if seen.insert(id.to_string()) {
            unique.push(id.to_string());
        }
    }
    Ok(unique)
}
