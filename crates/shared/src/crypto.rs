//! One-time secrets such as password reset tokens.
//!
//! Secrets are handed to the user once and only their SHA-256 digest is
//! stored.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32 random bytes, hex encoded (64 characters).
pub fn generate_secure_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex("same_input"), sha256_hex("same_input"));
        assert_ne!(sha256_hex("input1"), sha256_hex("input2"));
    }

    #[test]
    fn test_secure_token_shape() {
        let token = generate_secure_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secure_tokens_differ() {
        assert_ne!(generate_secure_token(), generate_secure_token());
    }
}
