//! Security utilities: API key hashing, PIN hashing and provider
//! webhook signatures.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Verifies an API key against a stored hash using constant-time comparison.
pub fn verify_api_key(input: &str, stored_hash: &str) -> bool {
    let input_hash = hash_api_key(input);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// PINs are exactly six ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == 6 && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Hashes a PIN salted with the owner's id, so equal PINs of different
/// users never share a hash.
pub fn hash_pin(user_id: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_pin(user_id: &str, pin: &str, stored_hash: &str) -> bool {
    let input_hash = hash_pin(user_id, pin);
    input_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Signs a webhook payload using HMAC-SHA256.
pub fn sign_webhook(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded webhook signature using constant-time comparison.
/// Casing of the hex digits is not significant.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = sign_webhook(payload, secret);
    let provided = signature.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_verification() {
        let key = "sk_test_abc123";
        let hash = hash_api_key(key);

        assert_eq!(hash.len(), 64);
        assert!(verify_api_key(key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn test_pin_format() {
        assert!(is_valid_pin("123456"));
        assert!(!is_valid_pin("12345"));
        assert!(!is_valid_pin("12345a"));
        assert!(!is_valid_pin("1234567"));
    }

    #[test]
    fn test_pin_hash_is_salted_by_user() {
        let a = hash_pin("user-a", "123456");
        let b = hash_pin("user-b", "123456");
        assert_ne!(a, b);
        assert!(verify_pin("user-a", "123456", &a));
        assert!(!verify_pin("user-a", "654321", &a));
        assert!(!verify_pin("user-b", "123456", &a));
    }

    #[test]
    fn test_webhook_signing() {
        let payload = br#"{"reference_id":"TRX-1","status":"paid"}"#;
        let secret = "webhook_secret_123";

        let signature = sign_webhook(payload, secret);
        assert!(verify_webhook_signature(payload, &signature, secret));
        assert!(verify_webhook_signature(
            payload,
            &signature.to_uppercase(),
            secret
        ));
        assert!(!verify_webhook_signature(
            payload,
            &signature,
            "wrong_secret"
        ));
        assert!(!verify_webhook_signature(b"tampered", &signature, secret));
        assert!(!verify_webhook_signature(payload, "", secret));
    }
}
