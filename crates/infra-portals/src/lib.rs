// Realty Infrastructure - Portal Adapters
// Implements: PortalAdapter over each portal's HTTP listing API

pub mod http_adapter;
pub mod payload;

pub use http_adapter::{classify_status, HttpPortalAdapter, HttpPortalConfig};
pub use payload::listing_payload;
