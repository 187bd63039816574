use std::time::{Duration, Instant};

use log::debug;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::ensure_success;
use crate::error::ApiError;

/// Refresh tokens a little before the server would reject them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub enum CredentialStyle {
    /// Client id and secret sent as HTTP basic auth (Space).
    BasicAuth,
    /// Client id and secret sent in the form body (Microsoft identity platform).
    FormBody,
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub style: CredentialStyle,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() + EXPIRY_MARGIN < at)
            .unwrap_or(true)
    }
}

/// OAuth2 client-credentials token, fetched on first use and renewed when it expires.
pub struct TokenCache {
    client: Client,
    credentials: ClientCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(client: Client, credentials: ClientCredentials) -> Self {
        Self {
            client,
            credentials,
            token: Mutex::new(None),
        }
    }

    pub async fn bearer(&self) -> Result<String, ApiError> {
        let mut token = self.token.lock().await;

        if let Some(cached) = token.as_ref().filter(|cached| cached.is_fresh()) {
            return Ok(cached.value.clone());
        }

        let fetched = self.fetch().await?;
        let value = fetched.value.clone();
        *token = Some(fetched);

        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken, ApiError> {
        debug!("requesting access token from {}", self.credentials.token_url);
        let credentials = &self.credentials;

        let request = self.client.post(&credentials.token_url);
        let request = match credentials.style {
            CredentialStyle::BasicAuth => request
                .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
                .form(&[
                    ("grant_type", "client_credentials"),
                    ("scope", credentials.scope.as_str()),
                ]),
            CredentialStyle::FormBody => request.form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("scope", credentials.scope.as_str()),
            ]),
        };

        let response = ensure_success(request.send().await?).await?;
        let token: TokenResponse = response.json().await?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}
