// BulkOperation Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{JobId, JobState};
use crate::domain::portal::Portal;
use crate::domain::property::PropertyId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bulk operation ID (UUID v4)
pub type BulkId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkKind {
    Publish,
    PriceUpdate,
    Schedule,
}

impl BulkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkKind::Publish => "publish",
            BulkKind::PriceUpdate => "priceUpdate",
            BulkKind::Schedule => "schedule",
        }
    }
}

impl fmt::Display for BulkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkKind {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "publish" => Ok(BulkKind::Publish),
            "priceUpdate" => Ok(BulkKind::PriceUpdate),
            "schedule" => Ok(BulkKind::Schedule),
            other => Err(DomainError::Validation(format!(
                "unknown bulk kind: {}",
                other
            ))),
        }
    }
}

/// How a price adjustment is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Percentage,
    Fixed,
}

impl FromStr for AdjustmentType {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(AdjustmentType::Percentage),
            "fixed" => Ok(AdjustmentType::Fixed),
            other => Err(DomainError::Validation(format!(
                "unknown adjustment type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAdjustment {
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
}

impl PriceAdjustment {
    pub fn new(amount: f64, kind: AdjustmentType) -> Result<Self> {
        if !amount.is_finite() {
            return Err(DomainError::Validation(
                "price adjustment must be a finite number".to_string(),
            ));
        }
        Ok(Self { amount, kind })
    }

    /// New price for `price`, rounded to cents and never below zero
    pub fn apply(&self, price: f64) -> f64 {
        let raw = match self.kind {
            AdjustmentType::Percentage => price * (1.0 + self.amount / 100.0),
            AdjustmentType::Fixed => price + self.amount,
        };
        ((raw * 100.0).round() / 100.0).max(0.0)
    }
}

/// A (property, portal) pair that did not spawn a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairOutcome {
    pub property_id: PropertyId,
    pub portal: Portal,
    pub reason: String,
}

/// Result of applying a price change to one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MutationOutcome {
    #[serde(rename_all = "camelCase")]
    Applied { old_price: f64, new_price: f64 },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceMutation {
    pub property_id: PropertyId,
    pub outcome: MutationOutcome,
}

/// What a bulk operation spawned. Job batches and mutation batches have
/// different failure shapes, so they never share a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BulkItems {
    #[serde(rename_all = "camelCase")]
    Jobs {
        job_ids: Vec<JobId>,
        skipped: Vec<PairOutcome>,
        rejected: Vec<PairOutcome>,
    },
    #[serde(rename_all = "camelCase")]
    PriceUpdates { mutations: Vec<PriceMutation> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperation {
    pub id: BulkId,
    pub kind: BulkKind,
    pub created_at: i64,
    pub items: BulkItems,
}

impl BulkOperation {
    pub fn job_ids(&self) -> &[JobId] {
        match &self.items {
            BulkItems::Jobs { job_ids, .. } => job_ids,
            BulkItems::PriceUpdates { .. } => &[],
        }
    }

    /// Number of items the summary accounts for
    pub fn item_count(&self) -> usize {
        match &self.items {
            BulkItems::Jobs { job_ids, .. } => job_ids.len(),
            BulkItems::PriceUpdates { mutations } => mutations.len(),
        }
    }
}

/// Aggregate outcome, always derived from constituent states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}

impl BulkSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.pending
    }

    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }

    /// Summarize job states. A job that cannot be found counts as failed:
    /// jobs are persisted before their id is handed out, so a missing record
    /// will never settle.
    pub fn from_job_states<I>(states: I) -> Self
    where
        I: IntoIterator<Item = Option<JobState>>,
    {
        let mut summary = Self::default();
        for state in states {
            match state {
                Some(JobState::Published) => summary.succeeded += 1,
                Some(JobState::Failed) | Some(JobState::Canceled) | None => {
                    summary.failed += 1
                }
                Some(_) => summary.pending += 1,
            }
        }
        summary
    }

    pub fn from_mutations(mutations: &[PriceMutation]) -> Self {
        let succeeded = mutations
            .iter()
            .filter(|m| matches!(m.outcome, MutationOutcome::Applied { .. }))
            .count();
        Self {
            succeeded,
            failed: mutations.len() - succeeded,
            pending: 0,
        }
    }
}
