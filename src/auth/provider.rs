//! Identity provider collaborator
//!
//! `IdentityProvider` is the seam between the session state machine and the
//! remote user pool. `CognitoIdp` implements it against the Cognito JSON API.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::srp::{PasswordVerifier, SrpClient};
use super::AuthError;
use crate::sync::{FederatedIdentity, SigningContext};

/// Region of the GoPlay user and identity pools
pub const COGNITO_REGION: &str = "eu-west-1";

/// GoPlay user pool
pub const COGNITO_POOL_ID: &str = "eu-west-1_dViSsKM5Y";

/// App client of the GoPlay user pool
pub const COGNITO_CLIENT_ID: &str = "6s1h851s8uplco5h6mqh1jac8m";

/// Identity pool that federates the user pool
pub const COGNITO_IDENTITY_POOL_ID: &str = "eu-west-1:8b7eb22c-cf61-43d5-a624-04b494867234";

/// Service name the federated credentials are used for
const SYNC_SERVICE: &str = "cognito-sync";

const AMZ_JSON: &str = "application/x-amz-json-1.1";

const PASSWORD_VERIFIER: &str = "PASSWORD_VERIFIER";

/// Tokens returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub id_token: String,
    pub refresh_token: String,
}

/// Remote user pool operations needed by the session manager
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Logs in with username and password
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthTokens, AuthError>;

    /// Exchanges a refresh token for a new id token
    async fn renew(&self, refresh_token: &str) -> Result<String, AuthError>;

    /// Exchanges an id token for an identity with temporary signing credentials
    async fn federated_identity(&self, id_token: &str) -> Result<FederatedIdentity, AuthError>;
}

/// Amazon Cognito user pool + identity pool client
#[derive(Debug, Clone)]
pub struct CognitoIdp {
    client: Client,
    region: String,
    user_pool_id: String,
    client_id: String,
    identity_pool_id: String,
    idp_endpoint: String,
    identity_endpoint: String,
}

impl CognitoIdp {
    /// Creates a client for the GoPlay pools
    pub fn new(client: Client) -> Self {
        Self {
            client,
            region: COGNITO_REGION.to_string(),
            user_pool_id: COGNITO_POOL_ID.to_string(),
            client_id: COGNITO_CLIENT_ID.to_string(),
            identity_pool_id: COGNITO_IDENTITY_POOL_ID.to_string(),
            idp_endpoint: format!("https://cognito-idp.{}.amazonaws.com/", COGNITO_REGION),
            identity_endpoint: format!("https://cognito-identity.{}.amazonaws.com/", COGNITO_REGION),
        }
    }

    /// Sends user pool and identity pool calls to other endpoints
    pub fn with_endpoints(mut self, idp: impl Into<String>, identity: impl Into<String>) -> Self {
        self.idp_endpoint = idp.into();
        self.identity_endpoint = identity.into();
        self
    }

    /// Key of the user pool in the identity pool's `Logins` map
    fn login_provider(&self) -> String {
        format!("cognito-idp.{}.amazonaws.com/{}", self.region, self.user_pool_id)
    }

    async fn call(&self, url: &str, target: &str, body: Value) -> Result<Value, AuthError> {
        debug!(operation = target, "calling cognito");
        let response = self
            .client
            .post(url)
            .header("X-Amz-Target", target)
            .header(CONTENT_TYPE, AMZ_JSON)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AuthError::AuthenticationUnavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::AuthenticationUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AuthError::AuthenticationUnavailable(format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdp {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthTokens, AuthError> {
        let srp = SrpClient::new(&self.user_pool_id)?;
        let body = json!({
            "AuthFlow": "USER_SRP_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": {
                "USERNAME": username,
                "SRP_A": srp.srp_a(),
            },
        });
        let response = self
            .call(&self.idp_endpoint, "AWSCognitoIdentityProviderService.InitiateAuth", body)
            .await?;

        let challenge = password_verifier(&response)?;
        let body = json!({
            "ClientId": self.client_id,
            "ChallengeName": PASSWORD_VERIFIER,
            "ChallengeResponses": srp.password_claim(&challenge, password, Utc::now())?,
        });
        let response = self
            .call(
                &self.idp_endpoint,
                "AWSCognitoIdentityProviderService.RespondToAuthChallenge",
                body,
            )
            .await?;

        let result = authentication_result(&response)?;
        Ok(AuthTokens {
            id_token: required_str(result, "IdToken")?,
            refresh_token: required_str(result, "RefreshToken")?,
        })
    }

    async fn renew(&self, refresh_token: &str) -> Result<String, AuthError> {
        let body = json!({
            "AuthFlow": "REFRESH_TOKEN_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": {
                "REFRESH_TOKEN": refresh_token,
            },
        });
        let response = self
            .call(&self.idp_endpoint, "AWSCognitoIdentityProviderService.InitiateAuth", body)
            .await?;

        required_str(authentication_result(&response)?, "IdToken")
    }

    async fn federated_identity(&self, id_token: &str) -> Result<FederatedIdentity, AuthError> {
        let mut logins = serde_json::Map::new();
        logins.insert(self.login_provider(), Value::from(id_token));
        let logins = Value::Object(logins);

        let response = self
            .call(
                &self.identity_endpoint,
                "AWSCognitoIdentityService.GetId",
                json!({ "IdentityPoolId": self.identity_pool_id, "Logins": logins.clone() }),
            )
            .await?;
        let identity_id = required_str(&response, "IdentityId")?;

        let response = self
            .call(
                &self.identity_endpoint,
                "AWSCognitoIdentityService.GetCredentialsForIdentity",
                json!({ "IdentityId": identity_id, "Logins": logins }),
            )
            .await?;

        Ok(FederatedIdentity {
            identity_pool_id: self.identity_pool_id.clone(),
            identity_id,
            context: signing_context(&response, &self.region)?,
        })
    }
}

/// Maps a non-2xx Cognito response to an `AuthError`
///
/// Rejected credentials or refresh tokens become `InvalidCredentials`,
/// everything else is treated as the service being unavailable.
pub fn classify_failure(status: u16, body: &str) -> AuthError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let kind = parsed
        .get("__type")
        .or_else(|| parsed.get("error"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    // Types may be namespaced, e.g. "com.amazon...#NotAuthorizedException"
    let kind = kind.rsplit('#').next().unwrap_or(kind);
    let message = parsed
        .get("message")
        .or_else(|| parsed.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or(kind)
        .to_string();

    match kind {
        "NotAuthorizedException"
        | "UserNotFoundException"
        | "UserNotConfirmedException"
        | "PasswordResetRequiredException"
        | "invalid_grant" => AuthError::InvalidCredentials(message),
        _ => AuthError::AuthenticationUnavailable(format!("HTTP {}: {}", status, message)),
    }
}

/// Reads the `PASSWORD_VERIFIER` challenge that answers an SRP `InitiateAuth`
fn password_verifier(response: &Value) -> Result<PasswordVerifier, AuthError> {
    match response.get("ChallengeName").and_then(Value::as_str) {
        Some(PASSWORD_VERIFIER) => {}
        Some(other) => {
            return Err(AuthError::AuthenticationUnavailable(format!(
                "unsupported challenge {}",
                other
            )))
        }
        None => return Err(missing("ChallengeName")),
    }
    let parameters = response
        .get("ChallengeParameters")
        .ok_or_else(|| missing("ChallengeParameters"))?;
    PasswordVerifier::from_parameters(parameters)
}

fn authentication_result(response: &Value) -> Result<&Value, AuthError> {
    if let Some(challenge) = response.get("ChallengeName").and_then(Value::as_str) {
        return Err(AuthError::AuthenticationUnavailable(format!(
            "unsupported challenge {}",
            challenge
        )));
    }
    response
        .get("AuthenticationResult")
        .ok_or_else(|| missing("AuthenticationResult"))
}

fn signing_context(response: &Value, region: &str) -> Result<SigningContext, AuthError> {
    let credentials = response.get("Credentials").ok_or_else(|| missing("Credentials"))?;

    Ok(SigningContext {
        access_key_id: required_str(credentials, "AccessKeyId")?,
        secret_key: required_str(credentials, "SecretKey")?,
        session_token: required_str(credentials, "SessionToken")?,
        region: region.to_string(),
        service: SYNC_SERVICE.to_string(),
    })
}

fn required_str(value: &Value, field: &str) -> Result<String, AuthError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(field))
}

fn missing(field: &str) -> AuthError {
    AuthError::AuthenticationUnavailable(format!("response is missing {}", field))
}
