use crate::utils::error::{IngressError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    secret: String,
    refresh_at: Instant,
}

/// OAuth2 client-credentials flow against Microsoft Entra ID.
#[derive(Debug)]
pub struct ClientSecretCredential {
    client: Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        client: Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self> {
        let token_url = Url::parse(&format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            tenant_id
        ))
        .map_err(|e| IngressError::InvalidConfigValueError {
            field: "Authorization.authority_host".to_string(),
            value: authority_host.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            token_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: STORAGE_SCOPE.to_string(),
            cached: Mutex::new(None),
        })
    }

    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.secret.clone());
            }
        }

        let token = self.request_token().await?;
        let secret = token.secret.clone();
        *cached = Some(token);
        Ok(secret)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        tracing::debug!("Requesting storage access token from {}", self.token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| IngressError::AuthenticationError {
                message: format!("token request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngressError::AuthenticationError {
                message: format!("token endpoint answered {}: {}", status, body),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| IngressError::AuthenticationError {
                    message: format!("malformed token response: {}", e),
                })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(CachedToken {
            secret: token.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}
