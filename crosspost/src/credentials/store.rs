//! Credential persistence abstraction.
//!
//! Refreshed tokens must be durably recorded before they are handed to a
//! caller. The concrete SQL implementation lives in the database repository
//! layer.

use async_trait::async_trait;

use super::error::CredentialError;
use super::refresher::RefreshedToken;
use super::types::{AliasKind, CredentialRecord, Provider};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential record for an (owner, provider) pair.
    async fn find(
        &self,
        owner_key: &str,
        provider: Provider,
    ) -> Result<Option<CredentialRecord>, CredentialError>;

    /// Create or replace the record for its (owner, provider) pair.
    async fn upsert(&self, record: &CredentialRecord) -> Result<(), CredentialError>;

    /// Apply a successful refresh in a single write.
    ///
    /// The stored refresh token is overwritten only when `refreshed` carries a
    /// new one; a failure leaves the previous record fully intact.
    async fn apply_refresh(
        &self,
        owner_key: &str,
        provider: Provider,
        refreshed: &RefreshedToken,
    ) -> Result<(), CredentialError>;

    /// Remove the record. Returns whether one existed.
    async fn delete(&self, owner_key: &str, provider: Provider)
    -> Result<bool, CredentialError>;

    /// Resolve an alias of the given kind to a canonical owner key.
    async fn resolve_alias(
        &self,
        alias: &str,
        kind: AliasKind,
    ) -> Result<Option<String>, CredentialError>;

    /// Register an alias for an owner (idempotent; last write wins).
    async fn register_alias(
        &self,
        alias: &str,
        kind: AliasKind,
        owner_key: &str,
    ) -> Result<(), CredentialError>;
}
