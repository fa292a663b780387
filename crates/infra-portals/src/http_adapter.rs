// HTTP portal adapter
// reason: reqwest for the portals' JSON listing APIs
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::payload::{listing_key, listing_payload};
use realty_core::domain::{Portal, PortalSettings, Property};
use realty_core::port::{AdapterError, PortalAdapter, ProgressReporter, PublishReceipt};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Connection settings for one portal's listing API
#[derive(Debug, Clone, PartialEq)]
pub struct HttpPortalConfig {
    pub portal: Portal,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Client-side timeout, kept below the queue's per-attempt timeout so the
    /// adapter can report `Timeout` itself
    pub request_timeout: Duration,
}

impl HttpPortalConfig {
    pub fn new(portal: Portal, base_url: impl Into<String>) -> Self {
        Self {
            portal,
            base_url: base_url.into(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default, alias = "listingUrl", alias = "link")]
    url: Option<String>,
}

/// `PortalAdapter` speaking a portal's REST listing API.
///
/// * publish: `POST {base}/listings`
/// * update: `PUT {base}/listings/{key}`
/// * unpublish: `DELETE {base}/listings/{key}`
pub struct HttpPortalAdapter {
    config: HttpPortalConfig,
    client: reqwest::Client,
}

impl HttpPortalAdapter {
    pub fn new(config: HttpPortalConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("realty-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client })
    }

    fn listings_url(&self) -> String {
        format!("{}/listings", self.config.base_url.trim_end_matches('/'))
    }

    fn listing_url(&self, property: &Property) -> String {
        format!(
            "{}/{}",
            self.listings_url(),
            listing_key(self.config.portal, property)
        )
    }

    fn authorize(&self, request: RequestBuilder, settings: &PortalSettings) -> RequestBuilder {
        let request = match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        match &settings.account_id {
            Some(account) => request.header("X-Account-Id", account),
            None => request,
        }
    }

    /// Send the request and turn the response into a receipt.
    ///
    /// `fallback_url` is used when the portal answers without a listing URL;
    /// `None` makes a missing URL an error.
    async fn send(
        &self,
        request: RequestBuilder,
        fallback_url: Option<String>,
        progress: &ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError> {
        progress.report(10);
        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        progress.report(60);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            warn!(portal = %self.config.portal, status = status.as_u16(), error = %err, "Portal rejected request");
            return Err(err);
        }

        let bytes = response.bytes().await.map_err(|e| classify_transport(&e))?;
        let url = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice::<ListingResponse>(&bytes)
                .map_err(|e| AdapterError::Unclassified(format!("unreadable portal response: {}", e)))?
                .url
        };
        progress.report(90);

        url.or(fallback_url)
            .map(|url| PublishReceipt { url })
            .ok_or_else(|| {
                AdapterError::Unclassified("portal response carried no listing url".to_string())
            })
    }
}

#[async_trait]
impl PortalAdapter for HttpPortalAdapter {
    fn portal(&self) -> Portal {
        self.config.portal
    }

    async fn publish(
        &self,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError> {
        debug!(portal = %self.config.portal, property_id = %property.id, "Publishing listing");
        let body = listing_payload(self.config.portal, property, settings);
        let request = self.authorize(self.client.post(self.listings_url()), settings);
        self.send(request.json(&body), None, &progress).await
    }

    async fn update(
        &self,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError> {
        debug!(portal = %self.config.portal, property_id = %property.id, "Updating listing");
        let url = self.listing_url(property);
        let body = listing_payload(self.config.portal, property, settings);
        let request = self.authorize(self.client.put(&url), settings);
        self.send(request.json(&body), Some(url), &progress).await
    }

    async fn unpublish(
        &self,
        property: &Property,
        settings: &PortalSettings,
        progress: ProgressReporter,
    ) -> Result<PublishReceipt, AdapterError> {
        debug!(portal = %self.config.portal, property_id = %property.id, "Removing listing");
        let url = self.listing_url(property);
        let request = self.authorize(self.client.delete(&url), settings);
        self.send(request, Some(url), &progress).await
    }
}

/// Map a non-success HTTP status to a failure kind.
///
/// 408, 429 and 5xx are worth retrying; any other 4xx means the portal
/// refused the listing. Anything else is left unclassified.
pub fn classify_status(status: StatusCode, body: &str) -> AdapterError {
    let detail: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), detail)
    };

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AdapterError::Retryable(message)
        }
        s if s.is_server_error() => AdapterError::Retryable(message),
        s if s.is_client_error() => AdapterError::Permanent(message),
        _ => AdapterError::Unclassified(message),
    }
}

fn classify_transport(err: &reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() || err.is_body() {
        AdapterError::Retryable(err.to_string())
    } else {
        AdapterError::Unclassified(err.to_string())
    }
}
