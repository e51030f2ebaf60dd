//! Webhook processing error types.

use thiserror::Error;

use crate::credits::CreditError;

use super::signature::SignatureError;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature verification failed. Fatal 4xx; no state was changed.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The body was not a parseable event envelope.
    #[error("Malformed webhook payload: {0}")]
    Malformed(String),

    /// A validly signed completed-checkout event with no resolvable owner.
    /// No marker is written so a corrected redelivery can still apply.
    #[error("Event {event_id} carries no owner reference")]
    UnknownOwner { event_id: String },

    /// Credit grant failure after the marker was written; the reconciliation
    /// sweep retries these.
    #[error("Credit error: {0}")]
    Credit(#[from] CreditError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WebhookError {
    /// Whether the failure is the caller's (4xx) rather than ours (5xx).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature(_) | Self::Malformed(_) | Self::UnknownOwner { .. }
        )
    }
}
