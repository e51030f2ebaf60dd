//! Payment webhook envelope types.

use serde::Deserialize;

/// The only event type that results in a credit grant.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Signed event envelope delivered by the payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSession,
}

/// The checkout session object carried by a completed-checkout event.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Paid amount in minor currency units.
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

/// Checkout metadata. Values arrive as strings on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub credits: Option<String>,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

impl CheckoutSession {
    /// Owner this payment belongs to: metadata user id first, then the
    /// client reference id.
    pub fn owner_key(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.user_id.as_deref())
            .or(self.client_reference_id.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Explicit credit amount from metadata, when present and parseable.
    pub fn explicit_credits(&self) -> Option<i64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.credits.as_deref())
            .and_then(|c| c.trim().parse::<i64>().ok())
    }

    /// Whether the session was actually paid. Missing status counts as paid:
    /// some providers omit it on synchronous payment methods.
    pub fn is_paid(&self) -> bool {
        self.payment_status
            .as_deref()
            .map(|s| s == "paid")
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_key_prefers_metadata() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "metadata": {"userId": "owner-1", "credits": "250"},
            "client_reference_id": "owner-2",
            "amount_total": 2000,
            "payment_status": "paid"
        }))
        .unwrap();

        assert_eq!(session.owner_key(), Some("owner-1"));
        assert_eq!(session.explicit_credits(), Some(250));
        assert!(session.is_paid());
    }

    #[test]
    fn test_owner_key_falls_back_to_client_reference() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "client_reference_id": "owner-2",
            "amount_total": 2000
        }))
        .unwrap();

        assert_eq!(session.owner_key(), Some("owner-2"));
        assert_eq!(session.explicit_credits(), None);
        assert!(session.is_paid());
    }

    #[test]
    fn test_unparseable_credits_ignored() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "metadata": {"credits": "lots"},
            "client_reference_id": "owner-1"
        }))
        .unwrap();

        assert_eq!(session.explicit_credits(), None);
    }
}
