use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature` (hex) against the raw webhook body in constant time.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign_payload(body, SECRET);
        assert!(verify_webhook_signature(body, &sig, SECRET));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign_payload(br#"{"event":"payment.captured"}"#, SECRET);
        assert!(!verify_webhook_signature(
            br#"{"event":"payment.failed"}"#,
            &sig,
            SECRET
        ));
    }

    #[test]
    fn rejects_non_hex_and_wrong_secret() {
        let body = b"{}";
        assert!(!verify_webhook_signature(body, "not-hex", SECRET));
        let sig = sign_payload(body, "other");
        assert!(!verify_webhook_signature(body, &sig, SECRET));
    }
}
