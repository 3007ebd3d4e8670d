//! UPI webhook signature verification
//!
//! The payment provider signs every webhook with HMAC-SHA256 over the
//! canonical payload `order_id|user_id|amount_inr` using the shared secret,
//! and sends the tag hex-encoded in the notification. Verification compares
//! in constant time through [`Mac::verify_slice`], and every failure mode
//! collapses into the same opaque [`Error::Signature`] so a caller probing
//! the endpoint cannot tell a bad secret from a malformed tag.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Canonical payload string signed by the provider
pub fn canonical_payload(order_id: &str, user_id: i64, amount_inr: u64) -> String {
    format!("{}|{}|{}", order_id, user_id, amount_inr)
}

/// Verify a hex-encoded HMAC-SHA256 signature over the canonical payload
///
/// An empty secret refuses everything: a deployment that never configured
/// the webhook secret must not accept unsigned notifications.
pub fn verify_signature(
    secret: &str,
    order_id: &str,
    user_id: i64,
    amount_inr: u64,
    signature_hex: &str,
) -> Result<()> {
    if secret.is_empty() {
        return Err(Error::Signature);
    }

    let expected = hex::decode(signature_hex).map_err(|_| Error::Signature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::Signature)?;
    mac.update(canonical_payload(order_id, user_id, amount_inr).as_bytes());
    mac.verify_slice(&expected).map_err(|_| Error::Signature)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, order_id: &str, user_id: i64, amount_inr: u64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(canonical_payload(order_id, user_id, amount_inr).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let sig = sign("topsecret", "ord-1", 42, 59);
        assert!(verify_signature("topsecret", "ord-1", 42, 59, &sig).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = sign("othersecret", "ord-1", 42, 59);
        assert!(matches!(
            verify_signature("topsecret", "ord-1", 42, 59, &sig),
            Err(Error::Signature)
        ));
    }

    #[test]
    fn test_tampered_amount_rejected() {
        let sig = sign("topsecret", "ord-1", 42, 59);
        assert!(matches!(
            verify_signature("topsecret", "ord-1", 42, 9999, &sig),
            Err(Error::Signature)
        ));
    }

    #[test]
    fn test_malformed_hex_rejected() {
        assert!(matches!(
            verify_signature("topsecret", "ord-1", 42, 59, "not-hex!"),
            Err(Error::Signature)
        ));
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let sig = sign("", "ord-1", 42, 59);
        assert!(matches!(
            verify_signature("", "ord-1", 42, 59, &sig),
            Err(Error::Signature)
        ));
    }
}
