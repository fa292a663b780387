//! JSON-RPC API Layer
//!
//! Request API for publication jobs and bulk operations, plus the
//! `publication.subscribe.v1` subscription carrying live status events.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use error::RpcServerError;
pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
