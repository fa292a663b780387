//! Realty Publisher SDK - Rust Client Library
//!
//! Request API client plus a live status channel that survives disconnects.
//!
//! # Example
//!
//! ```no_run
//! use realty_sdk::{EnqueueRequest, RealtyClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RealtyClient::connect("http://127.0.0.1:9630").await?;
//!
//!     let job = client
//!         .enqueue(EnqueueRequest::publish("prop-1", "fotocasa"))
//!         .await?;
//!     println!("Job enqueued: {}", job.id);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
pub mod live;
mod types;

pub use client::RealtyClient;
pub use error::{Result, SdkError};
pub use live::{
    ChannelState, CloseCode, EventStream, LiveStatusClient, LiveUpdate, ReconnectPolicy,
    StatusTransport, StreamItem, WsStatusTransport,
};
pub use types::{
    BulkStatus, BulkSummary, EnqueueRequest, Job, JobError, PriceAdjustment, StatusEvent,
    StatusEventData,
};
