/// Webhook signing and delivery for payment reconciliation.
pub mod automation;

pub use automation::AutomationForwarder;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Default window inside which a signed webhook timestamp is accepted.
pub const DEFAULT_TIMESTAMP_TOLERANCE_SECS: u64 = 300;

/// Computes the hex HMAC-SHA256 signature over `timestamp.body`.
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies an inbound webhook signature.
///
/// The timestamp must be a unix-seconds value inside the tolerance window,
/// and the signature must match in constant time. Both failures map to
/// `Unauthorized` without revealing which check tripped.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    provided_signature: &str,
    tolerance_secs: u64,
) -> Result<(), ServiceError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| ServiceError::Unauthorized("Invalid webhook timestamp".to_string()))?;

    let now = Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(ServiceError::Unauthorized(
            "Webhook timestamp outside tolerance".to_string(),
        ));
    }

    let provided = hex::decode(provided_signature)
        .map_err(|_| ServiceError::Unauthorized("Invalid webhook signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    mac.verify_slice(&provided)
        .map_err(|_| ServiceError::Unauthorized("Invalid webhook signature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "whsec_test";

    #[test]
    fn signature_roundtrip_verifies() {
        let timestamp = Utc::now().timestamp().to_string();
        let body = br#"{"type":"payment"}"#;
        let signature = compute_signature(SECRET, &timestamp, body);

        assert!(verify_signature(SECRET, &timestamp, body, &signature, 300).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = compute_signature(SECRET, &timestamp, b"original");

        let err = verify_signature(SECRET, &timestamp, b"tampered", &signature, 300).unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(_));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let stale = (Utc::now().timestamp() - 3600).to_string();
        let body = b"{}";
        let signature = compute_signature(SECRET, &stale, body);

        let err = verify_signature(SECRET, &stale, body, &signature, 300).unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(_));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let timestamp = Utc::now().timestamp().to_string();
        let body = b"{}";
        let signature = compute_signature("other_secret", &timestamp, body);

        assert!(verify_signature(SECRET, &timestamp, body, &signature, 300).is_err());
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let timestamp = Utc::now().timestamp().to_string();
        assert!(verify_signature(SECRET, &timestamp, b"{}", "not-hex!", 300).is_err());
    }
}
