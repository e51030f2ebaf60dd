//! OAuth2 refresh-token exchange.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::utils::http::build_client;

use super::error::CredentialError;
use super::provider::ProviderProfile;

/// Result of a successful token refresh.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// New refresh token, present only when the provider rotated it.
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<Vec<String>>,
    /// Absolute expiry derived from the response's `expires_in`.
    pub expires_at: DateTime<Utc>,
}

/// Provider-facing refresh collaborator.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange a refresh token for a new access token.
    ///
    /// # Returns
    /// * `Ok(RefreshedToken)` - refresh succeeded
    /// * `Err(AuthExpired)` - the refresh token was rejected; re-authorization required
    /// * `Err(UpstreamUnavailable)` - transient network or provider failure
    async fn refresh(
        &self,
        profile: &ProviderProfile,
        refresh_token: &str,
    ) -> Result<RefreshedToken, CredentialError>;
}

/// Wire shape of the token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    expires_in: i64,
}

/// Wire shape of an OAuth2 error response.
#[derive(Debug, Deserialize)]
struct TokenEndpointError {
    error: Option<String>,
    error_description: Option<String>,
}

/// HTTP implementation of [`TokenRefresher`].
pub struct OAuthTokenRefresher {
    client: reqwest::Client,
}

impl OAuthTokenRefresher {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            client: build_client(request_timeout),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(
        &self,
        profile: &ProviderProfile,
        refresh_token: &str,
    ) -> Result<RefreshedToken, CredentialError> {
        debug!(provider = %profile.provider, "Calling token endpoint");

        let params = [
            ("client_id", profile.client_id.as_str()),
            ("client_secret", profile.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .client
            .post(&profile.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();

        if status.is_client_error() {
            // 4xx means the provider understood us and said no: the refresh
            // token is invalid or revoked. Terminal until the user re-authorizes.
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TokenEndpointError>(&body)
                .ok()
                .and_then(|e| {
                    e.error_description
                        .or(e.error)
                        .filter(|s| !s.trim().is_empty())
                })
                .unwrap_or_else(|| format!("token endpoint returned {status}"));

            warn!(provider = %profile.provider, %status, %reason, "Refresh rejected by provider");
            return Err(CredentialError::AuthExpired { reason });
        }

        if !status.is_success() {
            return Err(CredentialError::UpstreamUnavailable {
                reason: format!("token endpoint returned {status}"),
            });
        }

        let body: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Parse(e.to_string()))?;

        Ok(RefreshedToken {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            token_type: body.token_type,
            scope: body
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect()),
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
        })
    }
}
