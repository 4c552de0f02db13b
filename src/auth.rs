//! Account authentication against Firebase Identity Toolkit.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Shortest credential the provider accepts, in characters.
pub const MIN_CREDENTIAL_LEN: usize = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a login or registration attempt failed.
///
/// The `Display` text is shown inline to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("The email address or password is incorrect.")]
    InvalidCredentials,
    #[error("This email address is already registered.")]
    AlreadyRegistered,
    #[error("The password must be at least 6 characters.")]
    CredentialTooShort,
    #[error("Something went wrong: {0}")]
    Other(String),
}

/// Opaque identifier of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, email: &str, credential: &str) -> Result<Identity, AuthFailure>;

    async fn register(&self, email: &str, credential: &str) -> Result<Identity, AuthFailure>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
struct AccountResponse {
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Identity Toolkit REST client.
pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuthFailure> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthFailure::Other(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://identitytoolkit.googleapis.com".to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AuthFailure> {
        let key = config
            .firebase_key()
            .map_err(|e| AuthFailure::Other(e.to_string()))?;
        Ok(Self::new(key)?.with_base_url(&config.auth.base_url))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn call(
        &self,
        method: &str,
        email: &str,
        credential: &str,
    ) -> Result<Identity, AuthFailure> {
        let url = format!("{}/v1/accounts:{}?key={}", self.base_url, method, self.api_key);
        let body = CredentialRequest {
            email,
            password: credential,
            return_secure_token: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthFailure::Other(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let code = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            tracing::debug!(method, %code, "authentication rejected");
            return Err(map_error_code(&code));
        }

        let account: AccountResponse = response
            .json()
            .await
            .map_err(|e| AuthFailure::Other(e.to_string()))?;
        Ok(Identity::new(account.email.unwrap_or_else(|| email.to_string())))
    }
}

/// Map an Identity Toolkit error code such as `"WEAK_PASSWORD : ..."`.
fn map_error_code(code: &str) -> AuthFailure {
    let key = code.split(':').next().unwrap_or(code).trim();
    match key {
        "EMAIL_EXISTS" => AuthFailure::AlreadyRegistered,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            AuthFailure::InvalidCredentials
        }
        "WEAK_PASSWORD" => AuthFailure::CredentialTooShort,
        _ => AuthFailure::Other(code.to_string()),
    }
}

#[async_trait]
impl Authenticator for FirebaseAuth {
    async fn login(&self, email: &str, credential: &str) -> Result<Identity, AuthFailure> {
        self.call("signInWithPassword", email, credential).await
    }

    async fn register(&self, email: &str, credential: &str) -> Result<Identity, AuthFailure> {
        if credential.chars().count() < MIN_CREDENTIAL_LEN {
            return Err(AuthFailure::CredentialTooShort);
        }
        self.call("signUp", email, credential).await
    }
}
