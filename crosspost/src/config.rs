//! Startup configuration loaded from the environment.
//!
//! Missing required secrets fail here, at startup, so no request path ever
//! discovers a misconfiguration at runtime.

use std::time::Duration;

use crate::credentials::{Provider, ProviderProfile};
use crate::error::{Error, Result};

/// Default credit conversion rate: 5 credits per major currency unit.
const DEFAULT_CREDITS_PER_CURRENCY_UNIT: u32 = 5;

/// Default minimum remaining validity of any access token handed out.
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 300;

/// Default accepted age of a signed webhook timestamp.
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Default timeout for provider token-endpoint calls.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

const DEFAULT_MEDIA_MAX_DOWNLOAD_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_MEDIA_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MEDIA_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_MEDIA_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_MEDIA_CACHE_MAX_ENTRIES: usize = 4096;

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Bearer token for provisioning endpoints. Unset disables them.
    pub admin_token: Option<String>,
    pub webhook: WebhookConfig,
    pub credits: CreditsConfig,
    pub credentials: CredentialConfig,
    pub media: MediaConfig,
}

/// Payment webhook verification settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret for the HMAC signature scheme.
    pub signing_secret: String,
    /// Maximum accepted age of a signed event timestamp.
    pub tolerance: Duration,
}

#[derive(Debug, Clone)]
pub struct CreditsConfig {
    /// Credits granted per major currency unit when an event carries no
    /// explicit credit amount.
    pub credits_per_currency_unit: u32,
    /// Signup bonus applied when an API key account is created.
    pub signup_grant: i64,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Tokens expiring within this window are refreshed before being returned.
    pub refresh_threshold: Duration,
    /// Timeout applied to provider token-endpoint calls.
    pub refresh_timeout: Duration,
    /// Providers with client credentials configured in the environment.
    pub providers: Vec<ProviderProfile>,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Upload endpoint of the rehost storage service.
    pub upload_url: String,
    /// Public base URL; anything already under this host is canonical.
    pub public_url: String,
    pub max_download_bytes: usize,
    pub download_timeout: Duration,
    pub fetch_attempts: u32,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env_opt("DATABASE_URL").unwrap_or_else(|| "sqlite:crosspost.db?mode=rwc".to_string());

        let webhook = WebhookConfig {
            signing_secret: env_required("PAYMENT_WEBHOOK_SECRET")?,
            tolerance: Duration::from_secs(env_parsed(
                "PAYMENT_WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            )),
        };

        let credits = CreditsConfig {
            credits_per_currency_unit: env_parsed(
                "CREDITS_PER_CURRENCY_UNIT",
                DEFAULT_CREDITS_PER_CURRENCY_UNIT,
            ),
            signup_grant: env_parsed("SIGNUP_CREDIT_GRANT", 10),
        };

        let credentials = CredentialConfig {
            refresh_threshold: Duration::from_secs(env_parsed(
                "TOKEN_REFRESH_THRESHOLD_SECS",
                DEFAULT_REFRESH_THRESHOLD_SECS,
            )),
            refresh_timeout: Duration::from_secs(env_parsed(
                "TOKEN_REFRESH_TIMEOUT_SECS",
                DEFAULT_REFRESH_TIMEOUT_SECS,
            )),
            providers: provider_profiles_from_env(),
        };

        let media = MediaConfig {
            upload_url: env_required("MEDIA_UPLOAD_URL")?,
            public_url: env_required("MEDIA_PUBLIC_URL")?,
            max_download_bytes: env_parsed(
                "MEDIA_MAX_DOWNLOAD_BYTES",
                DEFAULT_MEDIA_MAX_DOWNLOAD_BYTES,
            ),
            download_timeout: Duration::from_secs(env_parsed(
                "MEDIA_DOWNLOAD_TIMEOUT_SECS",
                DEFAULT_MEDIA_DOWNLOAD_TIMEOUT_SECS,
            )),
            fetch_attempts: env_parsed("MEDIA_FETCH_ATTEMPTS", DEFAULT_MEDIA_FETCH_ATTEMPTS),
            cache_ttl: Duration::from_secs(env_parsed(
                "MEDIA_CACHE_TTL_SECS",
                DEFAULT_MEDIA_CACHE_TTL_SECS,
            )),
            cache_max_entries: env_parsed(
                "MEDIA_CACHE_MAX_ENTRIES",
                DEFAULT_MEDIA_CACHE_MAX_ENTRIES,
            ),
        };

        Ok(Self {
            database_url,
            admin_token: env_opt("ADMIN_TOKEN"),
            webhook,
            credits,
            credentials,
            media,
        })
    }
}

/// Build profiles for every provider whose client credentials are present.
///
/// A provider without credentials is simply not refreshable; it is not a
/// configuration error.
fn provider_profiles_from_env() -> Vec<ProviderProfile> {
    Provider::ALL
        .iter()
        .filter_map(|&provider| {
            let prefix = provider.as_str().to_uppercase();
            let client_id = env_opt(&format!("{prefix}_CLIENT_ID"))?;
            let client_secret = env_opt(&format!("{prefix}_CLIENT_SECRET"))?;

            let mut profile = ProviderProfile::new(provider, client_id, client_secret);
            if let Some(endpoint) = env_opt(&format!("{prefix}_TOKEN_ENDPOINT")) {
                profile.token_endpoint = endpoint;
            }
            Some(profile)
        })
        .collect()
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_required(name: &str) -> Result<String> {
    env_opt(name).ok_or_else(|| Error::config(format!("{name} must be set")))
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
