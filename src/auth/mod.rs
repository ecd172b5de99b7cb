//! Authentication against the GoPlay user pool
//!
//! `SessionManager` hands out bearer tokens, refreshing or logging in through an
//! `IdentityProvider` when needed, and keeps them in a `CredentialStore` so a
//! restart does not force a new login.

pub mod provider;
pub mod session;
pub mod srp;
pub mod store;

pub use provider::{AuthTokens, CognitoIdp, IdentityProvider};
pub use session::SessionManager;
pub use store::{Credential, CredentialStore};

use thiserror::Error;

/// Errors that can occur while obtaining a token
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider rejected the username/password or refresh token
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The provider could not be reached or answered with a server error
    #[error("Authentication unavailable: {0}")]
    AuthenticationUnavailable(String),

    /// No username or password is configured
    #[error("No username or password configured")]
    MissingCredentials,
}

impl AuthError {
    /// Whether the user has to enter (new) credentials to get past this error
    pub fn needs_user_action(&self) -> bool {
        match self {
            AuthError::InvalidCredentials(_) | AuthError::MissingCredentials => true,
            AuthError::AuthenticationUnavailable(_) => false,
        }
    }
}
