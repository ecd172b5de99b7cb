//! Stub collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use url::Url;

use goplay::auth::{AuthError, AuthTokens, CredentialStore, IdentityProvider, SessionManager};
use goplay::cache::CacheManager;
use goplay::clock::ManualClock;
use goplay::content::{ContentError, ContentFetcher, PageFetcher};
use goplay::sync::{FederatedIdentity, SigningContext};

/// Serves canned responses per URL and records every request
#[derive(Default)]
pub struct StubPages {
    responses: Mutex<HashMap<String, Result<String, u16>>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
    bodies: Mutex<Vec<Value>>,
}

impl StubPages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses.lock().unwrap().insert(url.to_string(), Err(status));
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.requests.lock().unwrap().last().and_then(|(_, auth)| auth.clone())
    }

    pub fn last_body(&self) -> Option<Value> {
        self.bodies.lock().unwrap().last().cloned()
    }

    fn respond(&self, url: &str) -> Result<String, ContentError> {
        match self.responses.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(ContentError::FetchFailed {
                url: url.to_string(),
                status: Some(*status),
                reason: format!("HTTP {}", status),
            }),
            None => Err(ContentError::FetchFailed {
                url: url.to_string(),
                status: Some(404),
                reason: "HTTP 404".to_string(),
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for StubPages {
    async fn get(
        &self,
        url: &str,
        _params: &[(&str, &str)],
        authorization: Option<&str>,
    ) -> Result<String, ContentError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), authorization.map(str::to_string)));

        self.respond(url)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<String, ContentError> {
        self.requests.lock().unwrap().push((url.to_string(), None));
        self.bodies.lock().unwrap().push(body.clone());

        self.respond(url)
    }
}

/// Identity provider that accepts the password "secret"
#[derive(Default)]
pub struct StubProvider {
    pub logins: AtomicUsize,
    pub renewals: AtomicUsize,
    pub reject_refresh: bool,
    pub identity: Option<FederatedIdentity>,
}

impl StubProvider {
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn authenticate(&self, _username: &str, password: &str) -> Result<AuthTokens, AuthError> {
        if password != "secret" {
            return Err(AuthError::InvalidCredentials("Incorrect username or password.".to_string()));
        }
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AuthTokens {
            id_token: format!("id-{}", n),
            refresh_token: format!("refresh-{}", n),
        })
    }

    async fn renew(&self, _refresh_token: &str) -> Result<String, AuthError> {
        if self.reject_refresh {
            return Err(AuthError::InvalidCredentials("invalid_grant".to_string()));
        }
        let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("renewed-{}", n))
    }

    async fn federated_identity(&self, _id_token: &str) -> Result<FederatedIdentity, AuthError> {
        self.identity
            .clone()
            .ok_or_else(|| AuthError::AuthenticationUnavailable("no identity pool in tests".to_string()))
    }
}

/// A content fetcher over a temporary profile with stubbed collaborators
pub struct Harness {
    pub dir: TempDir,
    pub pages: Arc<StubPages>,
    pub provider: Arc<StubProvider>,
    pub clock: Arc<ManualClock>,
    pub content: ContentFetcher,
}

impl Harness {
    pub fn new(password: &str) -> Self {
        Self::build(password, StubProvider::default(), None)
    }

    /// A harness whose sync requests go to `endpoint` as `identity`
    pub fn with_sync(endpoint: Url, identity: FederatedIdentity) -> Self {
        let provider = StubProvider {
            identity: Some(identity),
            ..StubProvider::default()
        };
        Self::build("secret", provider, Some(endpoint))
    }

    fn build(password: &str, provider: StubProvider, sync_endpoint: Option<Url>) -> Self {
        let dir = TempDir::new().unwrap();
        let pages = StubPages::new();
        let provider = Arc::new(provider);
        let clock = Arc::new(ManualClock::starting_now());

        let session = SessionManager::new(
            provider.clone(),
            CredentialStore::new(dir.path().join("tokens")),
            "viewer@example.com",
            password,
        )
        .with_clock(clock.clone());
        let cache = CacheManager::new(dir.path().join("cache"), clock.clone());
        let mut content = ContentFetcher::new(pages.clone(), cache, Arc::new(session));
        if let Some(endpoint) = sync_endpoint {
            let client = reqwest::Client::builder().no_proxy().build().unwrap();
            content = content.with_sync_endpoint(endpoint).with_client(client);
        }

        Self {
            dir,
            pages,
            provider,
            clock,
            content,
        }
    }

    pub fn cache_file(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join("cache").join(name)
    }
}

pub fn test_identity() -> FederatedIdentity {
    FederatedIdentity {
        identity_pool_id: "eu-west-1:pool-1".to_string(),
        identity_id: "eu-west-1:ident-1".to_string(),
        context: SigningContext {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_key: "wJalrXUtnFEMI/K7MDENG".to_string(),
            session_token: "session-token-1".to_string(),
            region: "eu-west-1".to_string(),
            service: "cognito-sync".to_string(),
        },
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

pub fn overview_page(programs: &[(&str, &str)]) -> String {
    let links: String = programs
        .iter()
        .map(|(path, title)| {
            format!(
                r#"<a class="program-overview__link" href="/{}"><span class="program-overview__title">{}</span></a>"#,
                path, title
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", links)
}

pub fn program_data(path: &str, title: &str) -> Value {
    json!({
        "id": format!("{}-id", path),
        "link": format!("/{}", path),
        "title": title,
        "description": format!("All about {}", title),
        "pageInfo": { "site": "vier" },
        "images": { "poster": "https://images.example/poster.jpg", "hero": "https://images.example/hero.jpg" },
        "playlists": [
            {
                "id": format!("{}-s1", path),
                "link": format!("/{}/seizoen-1", path),
                "title": "Seizoen 1",
                "episodes": [
                    {
                        "videoUuid": format!("{}-video-1", path),
                        "pageInfo": { "nodeId": 501 },
                        "link": format!("/video/{}/seizoen-1/aflevering-1", path),
                        "title": "Aflevering 1",
                        "duration": 1500,
                        "seasonNumber": 1,
                        "episodeNumber": 1
                    },
                    {
                        "videoUuid": format!("{}-clip-1", path),
                        "pageInfo": { "nodeId": 601 },
                        "link": format!("/video/{}/extra/making-of", path),
                        "title": "Making of"
                    }
                ]
            }
        ]
    })
}

pub fn program_page(data: &Value) -> String {
    format!(
        r#"<html><body><div class="hero" data-hero="{}"></div></body></html>"#,
        escape_attribute(&json!({ "data": data }).to_string())
    )
}

pub fn episode_page(data: &Value, node_id: u64) -> String {
    format!(
        r#"<html><body><div class="hero" data-hero="{}"></div><script type="application/json" data-drupal-selector="drupal-settings-json">{}</script></body></html>"#,
        escape_attribute(&json!({ "data": data }).to_string()),
        json!({ "pageInfo": { "nodeId": node_id } })
    )
}
