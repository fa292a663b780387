//! RPC Error Types
//!
//! Maps application errors to stable JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use realty_core::domain::DomainError;
use realty_core::error::AppError;
use serde_json::json;
use thiserror::Error;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const NOT_CANCELABLE: i32 = 4004;
    pub const INVALID_TRANSITION: i32 = 4005;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
}

/// Failure to bring the server up
#[derive(Error, Debug)]
pub enum RpcServerError {
    #[error("Failed to bind RPC server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register RPC method: {0}")]
    Register(String),
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Conflict(msg) => ErrorObjectOwned::owned(code::CONFLICT, msg, None::<()>),
        AppError::DuplicateActiveJob {
            ref existing_job_id,
            ..
        } => ErrorObjectOwned::owned(
            code::CONFLICT,
            err.to_string(),
            Some(json!({ "existingJobId": existing_job_id })),
        ),
        AppError::NotCancelable { state, .. } => ErrorObjectOwned::owned(
            code::NOT_CANCELABLE,
            err.to_string(),
            Some(json!({ "state": state })),
        ),
        AppError::Domain(e @ DomainError::InvalidTransition { .. })
        | AppError::Domain(e @ DomainError::ProgressRegression { .. }) => {
            ErrorObjectOwned::owned(code::INVALID_TRANSITION, e.to_string(), None::<()>)
        }
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Database(msg) => ErrorObjectOwned::owned(code::DB_ERROR, msg, None::<()>),
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, e.to_string(), None::<()>)
        }
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
    }
}
