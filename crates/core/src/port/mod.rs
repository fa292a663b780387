// Port Layer - Interfaces for external collaborators

pub mod bulk_store;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod portal_adapter;
pub mod property_catalog;
pub mod time_provider;

// Re-exports
pub use bulk_store::BulkOperationStore;
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use portal_adapter::{
    AdapterError, PortalAdapter, PortalRegistry, ProgressReporter, PublishReceipt,
};
pub use property_catalog::PropertyCatalog;
pub use time_provider::TimeProvider;
