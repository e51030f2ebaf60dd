//! Credential lifecycle service.
//!
//! Guarantees every access token handed out has a bounded minimum remaining
//! validity, refreshing through the provider when needed. Refreshes are
//! single-flighted per (owner, provider): concurrent callers await the first
//! refresh's outcome instead of issuing duplicates, which would permanently
//! invalidate a rotating refresh token.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::error::CredentialError;
use super::provider::ProviderRegistry;
use super::refresher::TokenRefresher;
use super::resolver::OwnerResolver;
use super::store::CredentialStore;
use super::types::{
    AccessToken, AliasKind, CredentialGrant, CredentialRecord, OwnerLookup, Provider,
};

pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    providers: ProviderRegistry,
    resolver: OwnerResolver,
    /// Tokens expiring within this window are refreshed before being returned.
    refresh_threshold: Duration,
    /// Per-(owner, provider) locks serializing refreshes.
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        providers: ProviderRegistry,
        refresh_threshold: std::time::Duration,
    ) -> Self {
        let resolver = OwnerResolver::new(Arc::clone(&store));
        Self {
            store,
            refresher,
            providers,
            resolver,
            refresh_threshold: Duration::from_std(refresh_threshold)
                .unwrap_or_else(|_| Duration::seconds(300)),
            refresh_locks: DashMap::new(),
        }
    }

    /// Whether automatic refresh is configured for a provider.
    pub fn supports_refresh(&self, provider: Provider) -> bool {
        self.providers.supports(provider)
    }

    /// Return a valid access token for the owner identified by `lookup`.
    ///
    /// # Returns
    /// * `Ok(AccessToken)` - token with at least the configured threshold of
    ///   remaining validity
    /// * `Err(NotConnected)` - no credential record for this owner/provider
    /// * `Err(AuthExpired)` - refresh rejected; user must re-authorize
    /// * `Err(UpstreamUnavailable)` - transient failure; retryable by caller
    #[instrument(skip(self, lookup), fields(provider = %provider))]
    pub async fn get_valid_access_token(
        &self,
        lookup: &OwnerLookup,
        provider: Provider,
    ) -> Result<AccessToken, CredentialError> {
        let owner_key = self
            .resolver
            .resolve(lookup)
            .await?
            .ok_or(CredentialError::NotConnected { provider })?;

        self.token_for_owner(&owner_key, provider).await
    }

    /// Return a valid access token for a known owner key.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn token_for_owner(
        &self,
        owner_key: &str,
        provider: Provider,
    ) -> Result<AccessToken, CredentialError> {
        let record = self
            .store
            .find(owner_key, provider)
            .await?
            .ok_or(CredentialError::NotConnected { provider })?;

        if !record.expires_within(Utc::now(), self.refresh_threshold) {
            return Ok(record.access_token_view());
        }

        // Expiring soon: serialize the refresh for this credential.
        let lock = self.refresh_lock(owner_key, provider);
        let _guard = lock.lock().await;

        // Double-check after acquiring the lock; a concurrent caller may have
        // already refreshed and persisted.
        let record = self
            .store
            .find(owner_key, provider)
            .await?
            .ok_or(CredentialError::NotConnected { provider })?;

        if !record.expires_within(Utc::now(), self.refresh_threshold) {
            return Ok(record.access_token_view());
        }

        self.perform_refresh(owner_key, &record).await
    }

    /// Store the result of an authorization-code exchange.
    ///
    /// Creates or replaces the (owner, provider) record and registers the
    /// provider-native id and email as lookup aliases.
    #[instrument(skip(self, grant), fields(provider = %provider))]
    pub async fn connect(
        &self,
        owner_key: &str,
        provider: Provider,
        grant: CredentialGrant,
    ) -> Result<CredentialRecord, CredentialError> {
        let now = Utc::now();
        let record = CredentialRecord {
            owner_key: owner_key.to_string(),
            provider,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: grant.scope.unwrap_or_default(),
            expires_at: now + Duration::seconds(grant.expires_in),
            rotates_refresh_token: self.providers.rotates_refresh_token(provider),
            last_refreshed_at: None,
            created_at: now,
        };

        self.store.upsert(&record).await?;

        if let Some(uid) = grant.provider_uid.as_deref() {
            self.store
                .register_alias(uid, AliasKind::ProviderUid, owner_key)
                .await?;
        }
        if let Some(email) = grant.email.as_deref() {
            self.store
                .register_alias(email, AliasKind::Email, owner_key)
                .await?;
        }

        info!("Provider connected");
        Ok(record)
    }

    /// Remove the credential record. Returns whether one existed.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn disconnect(
        &self,
        owner_key: &str,
        provider: Provider,
    ) -> Result<bool, CredentialError> {
        self.store.delete(owner_key, provider).await
    }

    /// Perform the refresh call and persist the result before returning.
    async fn perform_refresh(
        &self,
        owner_key: &str,
        record: &CredentialRecord,
    ) -> Result<AccessToken, CredentialError> {
        let profile = self.providers.get(record.provider)?;

        let refresh_token =
            record
                .refresh_token
                .as_deref()
                .ok_or_else(|| CredentialError::AuthExpired {
                    reason: "no refresh token on record".to_string(),
                })?;

        info!("Starting credential refresh");

        let refreshed = match self.refresher.refresh(profile, refresh_token).await {
            Ok(r) => r,
            Err(e) => {
                if e.requires_reauthorization() {
                    error!(error = %e, "Credential refresh rejected - re-authorization required");
                } else {
                    warn!(error = %e, "Credential refresh failed");
                }
                return Err(e);
            }
        };

        let remaining = refreshed.expires_at - Utc::now();
        if remaining < self.refresh_threshold {
            warn!(
                remaining_secs = remaining.num_seconds(),
                "Provider issued a token shorter than the freshness threshold"
            );
        }

        // Persist before handing the token out: no token leaves this service
        // that is not durably recorded.
        self.store
            .apply_refresh(owner_key, record.provider, &refreshed)
            .await?;

        info!(expires_at = %refreshed.expires_at, "Credential refresh successful");

        Ok(AccessToken {
            token: refreshed.access_token,
            token_type: refreshed
                .token_type
                .unwrap_or_else(|| record.token_type.clone()),
            expires_at: refreshed.expires_at,
        })
    }

    /// Get or create a refresh lock for a credential.
    fn refresh_lock(&self, owner_key: &str, provider: Provider) -> Arc<Mutex<()>> {
        let key = CredentialRecord::lock_key(owner_key, provider);
        self.refresh_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
