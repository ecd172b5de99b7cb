//! Cognito Sync client
//!
//! Reads user datasets (such as "My List") from the sync service. Every
//! request is signed with the temporary credentials of a federated identity.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::sigv4::{RequestSigner, SignableRequest, SigningContext};

/// Records requested per page; datasets here are small enough for one page
const MAX_RESULTS: &str = "1024";

/// Errors that can occur when talking to the sync service
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("Sync service returned HTTP {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse sync response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The response has no record for the dataset
    #[error("Dataset '{0}' not found")]
    MissingDataset(String),

    #[error("Invalid sync URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// An identity in the identity pool together with its temporary credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub identity_pool_id: String,
    pub identity_id: String,
    pub context: SigningContext,
}

impl FederatedIdentity {
    /// Region prefix of the identity pool id (`eu-west-1:...`)
    pub fn region(&self) -> &str {
        self.identity_pool_id
            .split(':')
            .next()
            .unwrap_or(&self.context.region)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Record {
    key: String,
    value: Option<String>,
}

/// Client for one federated identity
#[derive(Debug, Clone)]
pub struct SyncClient {
    client: Client,
    signer: RequestSigner,
    identity: FederatedIdentity,
    endpoint: Option<Url>,
}

impl SyncClient {
    pub fn new(client: Client, signer: RequestSigner, identity: FederatedIdentity) -> Self {
        Self {
            client,
            signer,
            identity,
            endpoint: None,
        }
    }

    /// Talks to `endpoint` instead of the regional sync service
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// URL of the records of `dataset` for this identity
    ///
    /// Ids and the dataset name are escaped as single path segments.
    pub fn records_url(&self, dataset: &str) -> Result<Url, SyncError> {
        let mut url = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Url::parse(&format!("https://cognito-sync.{}.amazonaws.com/", self.identity.region()))?,
        };

        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend([
                "identitypools",
                self.identity.identity_pool_id.as_str(),
                "identities",
                self.identity.identity_id.as_str(),
                "datasets",
                dataset,
                "records",
            ]);
        url.query_pairs_mut().append_pair("maxResults", MAX_RESULTS);
        Ok(url)
    }

    /// Returns the decoded value stored under `dataset`
    pub async fn list_records(&self, dataset: &str) -> Result<Value, SyncError> {
        let url = self.records_url(dataset)?;
        let headers = self.signer.sign(
            &SignableRequest {
                method: "GET",
                url: &url,
                body: b"",
            },
            &self.identity.context,
        );

        let mut request = self.client.get(url.clone());
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }

        debug!(%url, "listing sync records");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        dataset_value(&body, dataset)
    }
}

/// Extracts and decodes the value of the record keyed `dataset`
///
/// Record values are JSON documents stored as strings.
pub fn dataset_value(body: &str, dataset: &str) -> Result<Value, SyncError> {
    let response: RecordsResponse = serde_json::from_str(body)?;

    let record = response
        .records
        .into_iter()
        .find(|record| record.key == dataset)
        .ok_or_else(|| SyncError::MissingDataset(dataset.to_string()))?;

    match record.value {
        Some(value) => Ok(serde_json::from_str(&value)?),
        None => Ok(Value::Null),
    }
}
