//! SigV4 request signing
//!
//! Computes the `x-amz-date` and `Authorization` headers for a request using
//! the HMAC-SHA256 key chain `secret -> date -> region -> service -> aws4_request`.
//! Only `host` and `x-amz-date` are signed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::clock::{Clock, SystemClock};

/// Algorithm identifier used in the string to sign and the authorization header
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Last element of the credential scope
const SCOPE_TERMINATOR: &str = "aws4_request";

const SIGNED_HEADERS: &str = "host;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

/// Temporary AWS credentials plus where they are used
///
/// Obtained from the identity pool for every signed call and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: String,
    pub region: String,
    pub service: String,
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

/// The parts of an HTTP request that take part in the signature
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub body: &'a [u8],
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub security_token: String,
}

impl SignedHeaders {
    /// Header name/value pairs, names in lower case
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("x-amz-date", self.amz_date.as_str()),
            ("authorization", self.authorization.as_str()),
            ("x-amz-security-token", self.security_token.as_str()),
        ]
        .into_iter()
    }
}

/// Signs requests at the current time of its clock
#[derive(Debug, Clone)]
pub struct RequestSigner {
    clock: Arc<dyn Clock>,
}

impl Default for RequestSigner {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RequestSigner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Signs `request`, reading the clock exactly once
    pub fn sign(&self, request: &SignableRequest<'_>, context: &SigningContext) -> SignedHeaders {
        sign(request, context, self.clock.now())
    }
}

/// Signs `request` as if sent at `at`
///
/// Pure function of its arguments: the same inputs always produce the same
/// headers.
pub fn sign(request: &SignableRequest<'_>, context: &SigningContext, at: DateTime<Utc>) -> SignedHeaders {
    let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = at.format("%Y%m%d").to_string();

    let canonical = canonical_request(request, &amz_date);
    let scope = format!(
        "{}/{}/{}/{}",
        date_stamp, context.region, context.service, SCOPE_TERMINATOR
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let key = signing_key(&context.secret_key, &date_stamp, &context.region, &context.service);
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, context.access_key_id, scope, SIGNED_HEADERS, signature
    );

    SignedHeaders {
        amz_date,
        authorization,
        security_token: context.session_token.clone(),
    }
}

/// Derives the per-day signing key
pub fn signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, SCOPE_TERMINATOR.as_bytes())
}

fn hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Builds the canonical request string
///
/// Order: method, URI-encoded path, sorted query, `host` and `x-amz-date`
/// headers (each followed by a newline), the signed header names and the hex
/// SHA-256 of the body.
fn canonical_request(request: &SignableRequest<'_>, amz_date: &str) -> String {
    let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host_header(request.url), amz_date);

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.to_ascii_uppercase(),
        canonical_uri(request.url),
        canonical_query(request.url),
        canonical_headers,
        SIGNED_HEADERS,
        hex::encode(Sha256::digest(request.body))
    )
}

fn canonical_uri(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }

    path.split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (urlencoding::encode(&k).into_owned(), urlencoding::encode(&v).into_owned()))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}
