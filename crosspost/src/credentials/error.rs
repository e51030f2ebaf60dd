//! Credential error types.

use thiserror::Error;

use super::types::Provider;

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential record exists - the user has not connected this provider.
    #[error("No {provider} credential connected for this owner")]
    NotConnected { provider: Provider },

    /// The refresh token was rejected - manual re-authorization required.
    #[error("Authorization expired: {reason}")]
    AuthExpired { reason: String },

    /// Transient provider or network failure - the caller may retry with
    /// backoff; the stored record is untouched.
    #[error("Provider unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    /// No client credentials configured for this provider.
    #[error("Provider not configured for refresh: {0}")]
    UnsupportedProvider(Provider),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed token endpoint response.
    #[error("Token response parse error: {0}")]
    Parse(String),
}

impl CredentialError {
    /// Whether this error requires the user to re-authorize the provider.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }

    /// Whether this error is transient and may be retried by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

impl From<reqwest::Error> for CredentialError {
    fn from(err: reqwest::Error) -> Self {
        // Network-level failures never invalidate the stored credential.
        Self::UpstreamUnavailable {
            reason: err.to_string(),
        }
    }
}
