// Portal Domain Model

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External advertising site a listing can be pushed to.
///
/// The set is closed: adding a portal means adding a variant and an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Portal {
    Idealista,
    Fotocasa,
    Habitaclia,
    AgencyWebsite,
}

impl Portal {
    pub const ALL: [Portal; 4] = [
        Portal::Idealista,
        Portal::Fotocasa,
        Portal::Habitaclia,
        Portal::AgencyWebsite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Portal::Idealista => "idealista",
            Portal::Fotocasa => "fotocasa",
            Portal::Habitaclia => "habitaclia",
            Portal::AgencyWebsite => "agency_website",
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Portal {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Portal::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownPortal(s.to_string()))
    }
}

/// Per-portal account settings handed to the adapter on every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortalSettings {
    pub account_id: Option<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}
