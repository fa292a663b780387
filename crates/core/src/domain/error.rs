// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Progress regression for job {job_id}: {current} -> {requested}")]
    ProgressRegression {
        job_id: String,
        current: u8,
        requested: u8,
    },

    #[error("Unknown portal: {0}")]
    UnknownPortal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
