//! API key authentication.
//!
//! Requests authenticate with an `X-API-Key` header carrying an account id.
//! The extractor resolves it to the account and rejects missing, unknown, or
//! revoked keys before any handler runs.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::credits::ApiKeyAccount;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated caller identity.
#[derive(Debug, Clone)]
pub struct ApiKeyIdentity {
    pub account: ApiKeyAccount,
}

impl ApiKeyIdentity {
    #[inline]
    pub fn owner_key(&self) -> &str {
        &self.account.owner_key
    }
}

impl FromRequestParts<AppState> for ApiKeyIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("API key required"))?;

        let account = state
            .accounts
            .get_account(api_key)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;

        if !account.is_active() {
            warn!(account_id = %account.id, "Rejected revoked API key");
            return Err(ApiError::forbidden("API key is revoked"));
        }

        Ok(Self { account })
    }
}
