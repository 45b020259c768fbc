//! Webhook Signature Verification
//!
//! Stripe signs each delivery with HMAC-SHA256 over `"{timestamp}.{raw body}"`
//! and sends the result in the `stripe-signature` header:
//!
//! ```text
//! stripe-signature: t=1614556800,v1=5257a869e7ec...,v1=...
//! ```
//!
//! Several `v1` entries appear while a secret is being rolled; any one of them
//! matching is enough. Comparison is constant-time.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::stripe::config::StripeWebhookConfig;
use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

const SCHEME_V1: &str = "v1";

/// Parsed `stripe-signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the provider signed
    pub timestamp: i64,
    /// Decoded `v1` signatures
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse the raw header value
    pub fn parse(header: &str) -> StripeWebhookResult<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        StripeWebhookError::MalformedSignatureHeader(
                            "timestamp is not an integer".to_string(),
                        )
                    })?);
                }
                SCHEME_V1 => {
                    // Entries that are not hex cannot match; skip them like the provider SDKs do.
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            StripeWebhookError::MalformedSignatureHeader("missing timestamp".to_string())
        })?;

        if signatures.is_empty() {
            return Err(StripeWebhookError::MalformedSignatureHeader(
                "no v1 signatures".to_string(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies (and, for tests and tooling, produces) webhook signatures
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Create a verifier from webhook configuration
    pub fn new(config: &StripeWebhookConfig) -> Self {
        Self {
            secret: config.webhook_secret().as_bytes().to_vec(),
            tolerance_secs: config.signature_tolerance.as_secs(),
        }
    }

    /// Verify `header` against `payload` using the current time
    pub fn verify(&self, payload: &[u8], header: &str) -> StripeWebhookResult<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify `header` against `payload` as of `now` (Unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> StripeWebhookResult<()> {
        let parsed = SignatureHeader::parse(header)?;
        let mac = self.mac_for(parsed.timestamp, payload);

        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

        if !matched {
            debug!(timestamp = parsed.timestamp, "Webhook signature mismatch");
            return Err(StripeWebhookError::SignatureMismatch);
        }

        let age_secs = now - parsed.timestamp;
        if self.tolerance_secs > 0 && age_secs > self.tolerance_secs as i64 {
            return Err(StripeWebhookError::TimestampOutsideTolerance {
                age_secs,
                tolerance_secs: self.tolerance_secs,
            });
        }

        Ok(())
    }

    /// Produce a header value for `payload` signed at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let digest = self.mac_for(timestamp, payload).finalize().into_bytes();
        format!("t={},{}={}", timestamp, SCHEME_V1, hex::encode(digest))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NOW: i64 = 1_767_268_800;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(&StripeWebhookConfig::new("whsec_test_secret"))
    }

    #[test]
    fn test_sign_then_verify() {
        let v = verifier();
        let payload = br#"{"id":"evt_1"}"#;
        let header = v.sign(payload, NOW);
        assert!(v.verify_at(payload, &header, NOW + 5).is_ok());
    }

    #[test]
    fn test_known_vector() {
        // HMAC-SHA256("whsec_test_secret", "1767268800.{}")
        let v = verifier();
        let header = v.sign(b"{}", NOW);
        let expected = {
            let mut mac = HmacSha256::new_from_slice(b"whsec_test_secret").unwrap();
            mac.update(b"1767268800.{}");
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(header, format!("t=1767268800,v1={expected}"));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let v = verifier();
        let header = v.sign(br#"{"amount":100}"#, NOW);
        let err = v.verify_at(br#"{"amount":999}"#, &header, NOW).unwrap_err();
        assert!(matches!(err, StripeWebhookError::SignatureMismatch));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = SignatureVerifier::new(&StripeWebhookConfig::new("whsec_other"));
        let header = other.sign(b"{}", NOW);
        assert!(verifier().verify_at(b"{}", &header, NOW).is_err());
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let v = verifier();
        let good = v.sign(b"{}", NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig},v0=legacy", "00".repeat(32));
        assert!(v.verify_at(b"{}", &header, NOW).is_ok());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let v = verifier();
        let header = v.sign(b"{}", NOW);
        let err = v.verify_at(b"{}", &header, NOW + 301).unwrap_err();
        assert!(matches!(
            err,
            StripeWebhookError::TimestampOutsideTolerance { age_secs: 301, .. }
        ));
    }

    #[test]
    fn test_zero_tolerance_disables_age_check() {
        let config = StripeWebhookConfig::new("whsec_test_secret").with_tolerance(Duration::ZERO);
        let v = SignatureVerifier::new(&config);
        let header = v.sign(b"{}", NOW);
        assert!(v.verify_at(b"{}", &header, NOW + 86_400).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(
            SignatureHeader::parse("v1=abcd"),
            Err(StripeWebhookError::MalformedSignatureHeader(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t=123"),
            Err(StripeWebhookError::MalformedSignatureHeader(_))
        ));
        assert!(matches!(
            SignatureHeader::parse("t=abc,v1=00"),
            Err(StripeWebhookError::MalformedSignatureHeader(_))
        ));
        assert!(SignatureHeader::parse("").is_err());
    }
}
