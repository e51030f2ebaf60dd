//! Core credential types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A third-party publishing platform the service can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Tiktok,
    Instagram,
    Youtube,
    Linkedin,
}

impl Provider {
    /// All supported providers, in a stable order.
    pub const ALL: [Provider; 4] = [
        Provider::Tiktok,
        Provider::Instagram,
        Provider::Youtube,
        Provider::Linkedin,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiktok => "tiktok",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Linkedin => "linkedin",
        }
    }

    /// Whether the provider issues a new refresh token on every refresh.
    ///
    /// Providers that rotate invalidate the old refresh token as soon as the
    /// new one is used, which is why refreshes must never be issued
    /// concurrently for the same credential.
    #[inline]
    pub fn rotates_refresh_token(&self) -> bool {
        match self {
            Self::Tiktok => true,
            Self::Instagram => true,
            Self::Youtube => false,
            Self::Linkedin => false,
        }
    }

    /// Default OAuth2 token endpoint.
    pub fn default_token_endpoint(&self) -> &'static str {
        match self {
            Self::Tiktok => "https://open.tiktokapis.com/v2/oauth/token/",
            Self::Instagram => "https://api.instagram.com/oauth/access_token",
            Self::Youtube => "https://oauth2.googleapis.com/token",
            Self::Linkedin => "https://www.linkedin.com/oauth/v2/accessToken",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tiktok" => Ok(Self::Tiktok),
            "instagram" => Ok(Self::Instagram),
            "youtube" => Ok(Self::Youtube),
            "linkedin" => Ok(Self::Linkedin),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable OAuth2 credential state for one (owner, provider) pair.
///
/// At most one record exists per pair. A refresh mutates the record in place;
/// the refresh token is overwritten only when the provider returned a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub owner_key: String,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub rotates_refresh_token: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Whether the token expires within `threshold` of `now`.
    #[inline]
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at - now < threshold
    }

    /// Key used for per-credential refresh locks.
    pub fn lock_key(owner_key: &str, provider: Provider) -> String {
        format!("{owner_key}:{}", provider.as_str())
    }

    /// View of the access token handed to callers.
    pub fn access_token_view(&self) -> AccessToken {
        AccessToken {
            token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// A valid access token with its remaining lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of an authorization-code exchange, used to create a credential.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<Vec<String>>,
    /// Lifetime of the access token, in seconds.
    pub expires_in: i64,
    /// Provider-native account id, registered as a lookup alias.
    pub provider_uid: Option<String>,
    /// Account email, registered as a lookup alias.
    pub email: Option<String>,
}

/// Identifier form of an owner alias, in lookup-precedence order.
///
/// Provider-native ids win because they cannot be reassigned across accounts;
/// emails lose because they can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    ProviderUid,
    OwnerKey,
    Email,
}

impl AliasKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderUid => "provider_uid",
            Self::OwnerKey => "owner_key",
            Self::Email => "email",
        }
    }
}

/// The identifier forms a caller may know an owner by.
#[derive(Debug, Clone, Default)]
pub struct OwnerLookup {
    pub provider_uid: Option<String>,
    pub owner_key: Option<String>,
    pub email: Option<String>,
}

impl OwnerLookup {
    /// Lookup by the canonical internal owner key only.
    pub fn by_owner_key(owner_key: impl Into<String>) -> Self {
        Self {
            owner_key: Some(owner_key.into()),
            ..Default::default()
        }
    }

    /// Candidate (kind, alias) pairs in precedence order.
    pub fn candidates(&self) -> impl Iterator<Item = (AliasKind, &str)> {
        [
            (AliasKind::ProviderUid, self.provider_uid.as_deref()),
            (AliasKind::OwnerKey, self.owner_key.as_deref()),
            (AliasKind::Email, self.email.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, alias)| alias.map(|a| (kind, a)))
    }
}
