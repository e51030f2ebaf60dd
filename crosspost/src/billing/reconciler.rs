//! Payment webhook reconciler.
//!
//! Converts possibly-duplicated, out-of-order payment events into
//! exactly-once credit grants. The idempotency marker is written before the
//! grant on purpose: "already marked" is the authoritative duplicate gate,
//! and a grant that fails after marking is retried by the sweep rather than
//! by a second webhook delivery.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::credits::{CreditLedger, GrantDestination};
use crate::database::repositories::{AccountRepository, IdempotencyRepository};

use super::error::WebhookError;
use super::event::{CHECKOUT_COMPLETED, WebhookEnvelope};
use super::signature::SignatureVerifier;

/// Terminal state of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// New event: credits granted.
    Credited { credits: i64 },
    /// Harmless redelivery of an already-processed event.
    Skipped,
    /// Verified event of a type (or payment state) we do not act on.
    Ignored,
}

pub struct WebhookReconciler {
    verifier: SignatureVerifier,
    markers: Arc<IdempotencyRepository>,
    accounts: Arc<AccountRepository>,
    ledger: Arc<CreditLedger>,
}

impl WebhookReconciler {
    pub fn new(
        verifier: SignatureVerifier,
        markers: Arc<IdempotencyRepository>,
        accounts: Arc<AccountRepository>,
        ledger: Arc<CreditLedger>,
    ) -> Self {
        Self {
            verifier,
            markers,
            accounts,
            ledger,
        }
    }

    /// Process one signed delivery.
    #[instrument(skip(self, signature_header, body))]
    pub async fn process(
        &self,
        signature_header: &str,
        body: &[u8],
    ) -> Result<Outcome, WebhookError> {
        // Authenticity first; an unsigned body changes no state.
        self.verifier.verify(signature_header, body)?;

        let envelope: WebhookEnvelope =
            serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;

        if envelope.event_type != CHECKOUT_COMPLETED {
            return Ok(Outcome::Ignored);
        }

        let session = &envelope.data.object;
        if !session.is_paid() {
            info!(event_id = %envelope.id, "Checkout completed but unpaid; ignoring");
            return Ok(Outcome::Ignored);
        }

        let owner_key = session
            .owner_key()
            .ok_or_else(|| WebhookError::UnknownOwner {
                event_id: envelope.id.clone(),
            })?
            .to_string();

        let gross = session.amount_total.unwrap_or(0);
        let credits = session
            .explicit_credits()
            .unwrap_or_else(|| self.ledger.credits_for_amount(gross))
            .max(0);

        // Claim the event id. Losing the claim means a redelivery.
        if !self.markers.try_mark(&envelope.id, &owner_key, credits).await? {
            info!(event_id = %envelope.id, "Duplicate payment event; skipping");
            return Ok(Outcome::Skipped);
        }

        // Purchase statistics are recorded regardless of where the credits
        // land; financial reporting must reflect the payment either way.
        self.accounts
            .record_purchase(&owner_key, gross, gross, credits)
            .await
            .map_err(|e| {
                error!(
                    event_id = %envelope.id,
                    owner_key = %owner_key,
                    error = %e,
                    "Failed to record purchase statistics after marking event"
                );
                e
            })?;

        match self.apply_grant(&envelope.id, &owner_key, credits).await {
            Ok(()) => {
                info!(
                    event_id = %envelope.id,
                    owner_key = %owner_key,
                    credits,
                    "Payment credited"
                );
                Ok(Outcome::Credited { credits })
            }
            Err(e) => {
                // The marker is durable, so this delivery will be skipped on
                // redelivery; only the sweep can finish the grant.
                error!(
                    event_id = %envelope.id,
                    owner_key = %owner_key,
                    credits,
                    error = %e,
                    "Grant failed after marker write; left for reconciliation sweep"
                );
                Err(e)
            }
        }
    }

    /// Re-attempt grants for markers whose grant never completed.
    ///
    /// Returns the number of grants applied.
    #[instrument(skip(self))]
    pub async fn retry_unapplied(&self, limit: i64) -> Result<usize, WebhookError> {
        let pending = self.markers.unapplied(limit).await?;
        let mut applied = 0;

        for marker in pending {
            match self
                .apply_grant(&marker.event_id, &marker.owner_key, marker.credits)
                .await
            {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(
                        event_id = %marker.event_id,
                        owner_key = %marker.owner_key,
                        error = %e,
                        "Sweep grant attempt failed; will retry next sweep"
                    );
                }
            }
        }

        if applied > 0 {
            info!(applied, "Reconciliation sweep applied pending grants");
        }
        Ok(applied)
    }

    /// Grant credits to the newest active account, falling back to the
    /// wallet, then flag the marker as credited.
    async fn apply_grant(
        &self,
        event_id: &str,
        owner_key: &str,
        credits: i64,
    ) -> Result<(), WebhookError> {
        let destination = match self.accounts.newest_active_account(owner_key).await? {
            Some(account) => GrantDestination::Account(account.id),
            None => GrantDestination::Wallet,
        };

        self.ledger.grant(owner_key, credits, &destination).await?;
        self.markers.mark_credited(event_id).await?;
        Ok(())
    }
}
