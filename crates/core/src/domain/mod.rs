// Domain Layer - Pure business logic and entities

pub mod bulk;
pub mod error;
pub mod event;
pub mod job;
pub mod portal;
pub mod property;

// Re-exports
pub use bulk::{
    AdjustmentType, BulkId, BulkItems, BulkKind, BulkOperation, BulkSummary, MutationOutcome,
    PairOutcome, PriceAdjustment, PriceMutation,
};
pub use error::DomainError;
pub use event::{StatusEvent, StatusEventData, StatusEventKind};
pub use job::{ErrorKind, JobError, JobId, JobState, PublicationAction, PublicationJob};
pub use portal::{Portal, PortalSettings};
pub use property::{Property, PropertyId};
