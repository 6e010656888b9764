//! HMAC-SHA256 signing and verification for completion webhooks.
//!
//! The job runner signs the raw request body with the shared
//! `WEBHOOK_SECRET` and sends the result in the [`SIGNATURE_HEADER`]
//! header as `sha256=<hex digest>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-signature-256";

/// Scheme prefix of the header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Reasons a webhook signature is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no webhook secret is configured")]
    NotConfigured,

    #[error("signature header is missing")]
    Missing,

    #[error("signature header is malformed")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,
}

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}

/// Compute the header value (`sha256=<hex>`) for a payload.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against the raw body.
///
/// The digest comparison is constant-time.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::NotConfigured)?;
    let header = header.ok_or(SignatureError::Missing)?;
    let digest = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(hex::decode)
        .ok_or(SignatureError::Malformed)?;

    let mut mac = mac_for(secret);
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| SignatureError::Mismatch)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"request_id":"FEAT-100","outcome":"success"}"#;

    #[test]
    fn signed_payload_verifies() {
        let header = sign_payload(SECRET, BODY);
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
        assert_eq!(verify_signature(Some(SECRET), BODY, Some(&header)), Ok(()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign_payload(SECRET, BODY);
        let tampered = br#"{"request_id":"FEAT-100","outcome":"failure"}"#;
        assert_eq!(
            verify_signature(Some(SECRET), tampered, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = sign_payload("other", BODY);
        assert_eq!(
            verify_signature(Some(SECRET), BODY, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn missing_header_is_rejected() {
        assert_eq!(
            verify_signature(Some(SECRET), BODY, None),
            Err(SignatureError::Missing)
        );
    }

    #[test]
    fn unconfigured_secret_rejects_everything() {
        let header = sign_payload("", BODY);
        assert_eq!(
            verify_signature(None, BODY, Some(&header)),
            Err(SignatureError::NotConfigured)
        );
        assert_eq!(
            verify_signature(Some(""), BODY, Some(&header)),
            Err(SignatureError::NotConfigured)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["deadbeef", "sha256=xyz", "sha256=abc", "sha1=00"] {
            assert_eq!(
                verify_signature(Some(SECRET), BODY, Some(header)),
                Err(SignatureError::Malformed),
                "header {header:?}"
            );
        }
    }

    #[test]
    fn truncated_digest_is_a_mismatch() {
        let header = sign_payload(SECRET, BODY);
        let truncated = &header[..header.len() - 2];
        assert_eq!(
            verify_signature(Some(SECRET), BODY, Some(truncated)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex::decode(&hex::encode([0u8, 15, 255])), Some(vec![0, 15, 255]));
        assert_eq!(hex::decode("0g"), None);
    }
}
