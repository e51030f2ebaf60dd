//! Owner identity resolution.
//!
//! A caller may know an owner by a provider-native account id, the internal
//! owner key, or an email address. The most stable identifier wins:
//! provider-native ids cannot be reassigned across accounts, so they take
//! precedence, then the internal key, then email.

use std::sync::Arc;

use tracing::debug;

use super::error::CredentialError;
use super::store::CredentialStore;
use super::types::{AliasKind, OwnerLookup};

pub struct OwnerResolver {
    store: Arc<dyn CredentialStore>,
}

impl OwnerResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Resolve a lookup to a canonical owner key, trying identifier forms in
    /// precedence order.
    pub async fn resolve(&self, lookup: &OwnerLookup) -> Result<Option<String>, CredentialError> {
        for (kind, alias) in lookup.candidates() {
            // The internal key is canonical; it needs no alias table hop.
            if kind == AliasKind::OwnerKey {
                return Ok(Some(alias.to_string()));
            }

            if let Some(owner_key) = self.store.resolve_alias(alias, kind).await? {
                debug!(kind = kind.as_str(), "Resolved owner via alias");
                return Ok(Some(owner_key));
            }
        }

        Ok(None)
    }
}
