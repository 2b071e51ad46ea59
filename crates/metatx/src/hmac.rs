//! Shared-secret authentication between a client and a relayer.
//!
//! When the relayer is configured with a secret, every `POST /relay` body must
//! carry `X-Relay-Auth: <hex HMAC-SHA256(secret, body)>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body MAC.
pub const RELAY_AUTH_HEADER: &str = "X-Relay-Auth";

fn keyed(secret: &[u8]) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts any key length")
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign_body(secret: &[u8], body: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(body);
    alloy::hex::encode(mac.finalize().into_bytes())
}

/// Check a hex MAC produced by [`sign_body`]. Comparison is constant-time and
/// malformed hex is compared as zeros rather than short-circuiting.
pub fn verify_body(secret: &[u8], body: &[u8], mac_hex: &str) -> bool {
    let mut mac = keyed(secret);
    mac.update(body);

    let raw = mac_hex.strip_prefix("0x").unwrap_or(mac_hex);
    let expected = alloy::hex::decode(raw).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"request":{},"signature":"0x00"}"#;
        let mac = sign_body(b"relay-secret", body);
        assert_eq!(mac.len(), 64);
        assert!(verify_body(b"relay-secret", body, &mac));
        assert!(verify_body(b"relay-secret", body, &format!("0x{mac}")));
    }

    #[test]
    fn test_other_secret_rejected() {
        let mac = sign_body(b"one", b"body");
        assert!(!verify_body(b"two", b"body", &mac));
    }

    #[test]
    fn test_modified_body_rejected() {
        let mac = sign_body(b"secret", b"register defender");
        assert!(!verify_body(b"secret", b"register attacker", &mac));
    }

    #[test]
    fn test_garbage_mac_rejected() {
        assert!(!verify_body(b"secret", b"body", "zz-not-hex"));
        assert!(!verify_body(b"secret", b"body", ""));
    }
}
