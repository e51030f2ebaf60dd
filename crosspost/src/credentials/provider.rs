//! Per-provider refresh parameters.
//!
//! Every provider's refresh call has the same wire shape; the differences
//! that matter are captured here so one generic refresher serves all of them.

use std::collections::HashMap;

use super::error::CredentialError;
use super::types::Provider;

/// The per-provider trait set needed to drive a token refresh.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider: Provider,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// Whether the provider issues a new refresh token on every refresh.
    pub rotates_refresh_token: bool,
}

impl ProviderProfile {
    pub fn new(
        provider: Provider,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            token_endpoint: provider.default_token_endpoint().to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            rotates_refresh_token: provider.rotates_refresh_token(),
        }
    }
}

/// Registry of configured providers.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    profiles: HashMap<Provider, ProviderProfile>,
}

impl ProviderRegistry {
    pub fn new(profiles: impl IntoIterator<Item = ProviderProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.provider, p)).collect(),
        }
    }

    pub fn register(&mut self, profile: ProviderProfile) {
        self.profiles.insert(profile.provider, profile);
    }

    pub fn get(&self, provider: Provider) -> Result<&ProviderProfile, CredentialError> {
        self.profiles
            .get(&provider)
            .ok_or(CredentialError::UnsupportedProvider(provider))
    }

    /// Whether refresh is configured for this provider.
    pub fn supports(&self, provider: Provider) -> bool {
        self.profiles.contains_key(&provider)
    }

    /// Rotation behavior for a provider, falling back to the built-in default
    /// when no profile is registered.
    pub fn rotates_refresh_token(&self, provider: Provider) -> bool {
        self.profiles
            .get(&provider)
            .map(|p| p.rotates_refresh_token)
            .unwrap_or_else(|| provider.rotates_refresh_token())
    }
}
