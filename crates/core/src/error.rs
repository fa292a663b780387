// Central Error Type for the Application

use crate::domain::{JobId, JobState, Portal, PropertyId};
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Active job {existing_job_id} already exists for {property_id} on {portal}")]
    DuplicateActiveJob {
        property_id: PropertyId,
        portal: Portal,
        existing_job_id: JobId,
    },

    #[error("Job {job_id} is not cancelable in state {state}")]
    NotCancelable { job_id: JobId, state: JobState },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Database(String)
