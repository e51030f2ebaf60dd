//! Webhook signature verification.
//!
//! The provider signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends
//! the result in a `t=...,v1=...` header. Verification is constant-time and
//! bounded by a clock tolerance so captured deliveries cannot be replayed
//! much later.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("Signature mismatch")]
    Mismatch,
}

pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: chrono::Duration,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>, tolerance: std::time::Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tolerance: chrono::Duration::from_std(tolerance)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
        }
    }

    /// Verify a signature header against the raw request body.
    pub fn verify(&self, header: &str, payload: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(header, payload, Utc::now())
    }

    fn verify_at(
        &self,
        header: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let (timestamp, candidates) = parse_header(header)?;

        let age = now - timestamp;
        if age > self.tolerance || age < -self.tolerance {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.timestamp().to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        // verify_slice is constant-time; try every v1 candidate.
        for candidate in &candidates {
            let Ok(sig) = hex::decode(candidate) else {
                continue;
            };
            if mac.clone().verify_slice(&sig).is_ok() {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Produce a signature header for a payload. Used by tests and outbound
    /// delivery simulation.
    pub fn sign(&self, payload: &[u8], at: DateTime<Utc>) -> String {
        let timestamp = at.timestamp();
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }
}

/// Parse `t=<unix>,v1=<hex>[,v1=<hex>...]`.
fn parse_header(header: &str) -> Result<(DateTime<Utc>, Vec<String>), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                let secs: i64 = value.parse().map_err(|_| SignatureError::Malformed)?;
                timestamp = Utc.timestamp_opt(secs, 0).single();
            }
            "v1" => candidates.push(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, candidates.is_empty()) {
        (Some(t), false) => Ok((t, candidates)),
        _ => Err(SignatureError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new("whsec_test", std::time::Duration::from_secs(300))
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let v = verifier();
        let now = Utc::now();
        let header = v.sign(b"{\"id\":\"evt-1\"}", now);

        assert_eq!(v.verify_at(&header, b"{\"id\":\"evt-1\"}", now), Ok(()));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let v = verifier();
        let now = Utc::now();
        let header = v.sign(b"original", now);

        assert_eq!(
            v.verify_at(&header, b"tampered", now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = Utc::now();
        let header =
            SignatureVerifier::new("other", std::time::Duration::from_secs(300)).sign(b"x", now);

        assert_eq!(
            verifier().verify_at(&header, b"x", now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let v = verifier();
        let then = Utc::now() - chrono::Duration::seconds(600);
        let header = v.sign(b"x", then);

        assert_eq!(
            v.verify_at(&header, b"x", Utc::now()),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_malformed_header() {
        let v = verifier();
        assert!(v.verify("not-a-header", b"x").is_err());
        assert_eq!(
            v.verify_at("v1=deadbeef", b"x", Utc::now()),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            v.verify_at("t=123", b"x", Utc::now()),
            Err(SignatureError::Malformed)
        );
    }
}
