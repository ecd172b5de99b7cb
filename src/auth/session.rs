//! Session state machine
//!
//! `Empty -> Valid` by login, `Valid -> Expired` as time passes,
//! `Expired -> Valid` by refresh, or `Expired -> Empty -> Valid` when the
//! refresh token is rejected and a full login follows.

use chrono::Duration;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::provider::IdentityProvider;
use super::store::{Credential, CredentialStore};
use super::AuthError;
use crate::clock::{Clock, SystemClock};
use crate::sync::FederatedIdentity;

/// Lifetime of an id token issued by the user pool
pub const SESSION_LIFETIME_SECS: i64 = 3600;

/// Hands out valid bearer tokens, logging in or refreshing as needed
///
/// The credential is loaded from the store once at construction and written
/// back after every change. All state transitions happen under one async
/// mutex, so concurrent callers never race on a login or refresh.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    store: CredentialStore,
    username: String,
    password: String,
    clock: Arc<dyn Clock>,
    session_lifetime: Duration,
    state: Mutex<Credential>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("username", &self.username)
            .field("session_lifetime", &self.session_lifetime)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a session manager, restoring any session persisted in `store`
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: CredentialStore,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let credential = store.load();
        Self {
            provider,
            store,
            username: username.into(),
            password: password.into(),
            clock: Arc::new(SystemClock),
            session_lifetime: Duration::seconds(SESSION_LIFETIME_SECS),
            state: Mutex::new(credential),
        }
    }

    /// Uses `clock` to decide token expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a bearer token that is valid right now
    ///
    /// Reuses the in-memory token while it is valid, otherwise refreshes it, and
    /// logs in with username and password when there is nothing to refresh or
    /// the refresh token was rejected. Errors are never retried here.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let mut credential = self.state.lock().await;
        let now = self.clock.now().timestamp();

        if let Some(token) = credential.valid_id_token(now) {
            debug!("using id token from memory");
            return Ok(token.to_string());
        }

        if let Some(refresh_token) = credential.refresh_token.clone() {
            debug!("refreshing id token");
            match self.provider.renew(&refresh_token).await {
                Ok(id_token) => {
                    *credential = Credential {
                        id_token: Some(id_token.clone()),
                        refresh_token: Some(refresh_token),
                        expiry: now + self.session_lifetime.num_seconds(),
                    };
                    self.persist(&credential);
                    info!("session refreshed");
                    return Ok(id_token);
                }
                Err(AuthError::InvalidCredentials(reason)) => {
                    warn!(%reason, "refresh token rejected, logging in again");
                    *credential = Credential::default();
                    self.forget();
                }
                Err(e) => return Err(e),
            }
        }

        if self.username.is_empty() || self.password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        debug!(username = %self.username, "logging in");
        let tokens = self.provider.authenticate(&self.username, &self.password).await?;
        *credential = Credential {
            id_token: Some(tokens.id_token.clone()),
            refresh_token: Some(tokens.refresh_token),
            expiry: now + self.session_lifetime.num_seconds(),
        };
        self.persist(&credential);
        info!(username = %self.username, "logged in");

        Ok(tokens.id_token)
    }

    /// Drops the in-memory and persisted session
    pub async fn clear_session(&self) {
        let mut credential = self.state.lock().await;
        *credential = Credential::default();
        self.forget();
        info!("session cleared");
    }

    /// Exchanges a valid id token for a federated identity with signing credentials
    pub async fn federated_identity(&self) -> Result<FederatedIdentity, AuthError> {
        let token = self.get_token().await?;
        self.provider.federated_identity(&token).await
    }

    /// Snapshot of the current credential
    pub async fn credential(&self) -> Credential {
        self.state.lock().await.clone()
    }

    fn persist(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential) {
            warn!(error = %e, "failed to persist session");
        }
    }

    fn forget(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to remove persisted session");
        }
    }
}
