//! Catalog content access
//!
//! `ContentFetcher` turns GoPlay pages and API responses into catalog records.
//! Page and API requests go through a `PageFetcher` so they can be replaced in
//! tests; `HttpFetcher` is the reqwest-backed implementation.

mod fetcher;

pub use fetcher::{ContentFetcher, API_URL, DETAIL_TTL_DAYS, GUIDE_TTL_SECS, LISTING_TTL_SECS, SITE_URL};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::auth::AuthError;
use crate::cache::{CacheMiss, Recoverable};
use crate::data::{Channel, PayloadError, UnknownChannel};
use crate::sync::SyncError;

/// Errors that can occur while fetching catalog content
#[derive(Debug, Error)]
pub enum ContentError {
    /// No valid token could be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transport error or non-2xx response
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The response did not have the expected shape
    #[error("Unexpected response format: {0}")]
    MalformedPayload(#[from] PayloadError),

    /// Only the cache was consulted and it had no fresh entry
    #[error("Not available in the local cache")]
    NotCached,

    /// The video may not be played from this country
    #[error("This video is geo-blocked")]
    Geoblocked,

    /// The video no longer exists
    #[error("This video is unavailable")]
    Unavailable,

    #[error(transparent)]
    UnknownChannel(#[from] UnknownChannel),

    #[error("{} has no TV guide", .0.name())]
    NoGuide(Channel),
}

impl ContentError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ContentError::FetchFailed { status, .. } => *status,
            _ => None,
        }
    }
}

impl Recoverable for ContentError {
    fn is_recoverable(&self) -> bool {
        matches!(self, ContentError::FetchFailed { .. } | ContentError::MalformedPayload(_))
    }
}

impl From<CacheMiss> for ContentError {
    fn from(_: CacheMiss) -> Self {
        ContentError::NotCached
    }
}

impl From<SyncError> for ContentError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::RequestFailed(e) => ContentError::FetchFailed {
                url: e.url().map(|url| url.to_string()).unwrap_or_default(),
                status: e.status().map(|status| status.as_u16()),
                reason: e.to_string(),
            },
            SyncError::Status(status) => ContentError::FetchFailed {
                url: "cognito-sync".to_string(),
                status: Some(status),
                reason: format!("HTTP {}", status),
            },
            other => ContentError::MalformedPayload(PayloadError(other.to_string())),
        }
    }
}

/// Fetches pages and API responses as text
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GETs `url` with the given query parameters
    ///
    /// `authorization` is sent as the `Authorization` header when given.
    async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        authorization: Option<&str>,
    ) -> Result<String, ContentError>;

    /// POSTs `body` as JSON to `url`
    async fn post_json(&self, url: &str, body: &Value) -> Result<String, ContentError>;
}

/// `PageFetcher` over a reqwest client
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<String, ContentError> {
        let failed = |e: reqwest::Error| ContentError::FetchFailed {
            url: url.to_string(),
            status: e.status().map(|status| status.as_u16()),
            reason: e.to_string(),
        };

        debug!(url, "fetching");
        let response = request.send().await.map_err(failed)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::FetchFailed {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(failed)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        authorization: Option<&str>,
    ) -> Result<String, ContentError> {
        let mut request = self.client.get(url).query(params);
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        self.send(url, request).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String, ContentError> {
        self.send(url, self.client.post(url).json(body)).await
    }
}
