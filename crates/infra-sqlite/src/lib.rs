// Realty Infrastructure - SQLite Adapter
// Implements: JobStore, BulkOperationStore, PropertyCatalog

mod bulk_store;
mod connection;
mod error;
mod job_store;
mod migration;
mod property_catalog;

pub use bulk_store::SqliteBulkOperationStore;
pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;
pub use property_catalog::SqlitePropertyCatalog;

// Note: sqlx::Error conversion lives in error.rs as a helper function
// (orphan rules: no From<sqlx::Error> for AppError in this crate)
