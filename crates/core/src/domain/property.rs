// Property snapshot handed to portal adapters

use serde::{Deserialize, Serialize};

/// Property identifier (owned by the property catalog)
pub type PropertyId = String;

/// Listing data as the catalog knows it at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub reference: String,
    pub title: String,
    pub price: f64,
    /// Free-form listing attributes (rooms, surface, address, photos...)
    #[serde(default)]
    pub attributes: serde_json::Value,
}
