//! Callback signing: HMAC-SHA256 over `reference|transaction_id|status|amount`,
//! hex encoded.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn signing_payload(reference: &str, transaction_id: &str, status: &str, amount: &str) -> String {
    format!("{reference}|{transaction_id}|{status}|{amount}")
}

pub fn sign_hmac_sha256_hex(secret: &str, data: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_hmac_sha256_hex(secret: &str, data: &str, signature: &str) -> bool {
    let expected = sign_hmac_sha256_hex(secret, data);
    let provided = signature.trim().to_ascii_lowercase();
    !expected.is_empty() && constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let data = signing_payload("pay_abc", "tx_1", "success", "450.00");
        let signature = sign_hmac_sha256_hex("secret", &data);

        assert_eq!(signature.len(), 64);
        assert!(verify_hmac_sha256_hex("secret", &data, &signature));
        assert!(verify_hmac_sha256_hex("secret", &data, &signature.to_uppercase()));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let data = signing_payload("pay_abc", "tx_1", "success", "450.00");
        let signature = sign_hmac_sha256_hex("secret", &data);

        let tampered = signing_payload("pay_abc", "tx_1", "success", "1.00");
        assert!(!verify_hmac_sha256_hex("secret", &tampered, &signature));
        assert!(!verify_hmac_sha256_hex("other", &data, &signature));
        assert!(!verify_hmac_sha256_hex("secret", &data, ""));
    }
}
