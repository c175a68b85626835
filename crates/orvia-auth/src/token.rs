//! Opaque security token generation and hashing.
//!
//! Challenge tokens, revocable session tokens and API key suffixes are all
//! 256-bit random values. Only the SHA-256 hash of a token is ever stored;
//! the plaintext exists server-side for the duration of the issuing request
//! and never again.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Size of generated tokens in bytes (256 bits of entropy).
pub const SECURE_TOKEN_BYTES: usize = 32;

/// Generate a cryptographically secure random token.
///
/// 32 bytes from the operating system CSPRNG, base64url-encoded without
/// padding (43 characters). Not derived from UUIDs, which are not designed
/// for secret material.
#[must_use]
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; SECURE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the SHA-256 hash of a token, hex-encoded, for storage and lookup.
///
/// Plain SHA-256 without salt is appropriate here: the inputs are 256-bit
/// random values, so precomputation attacks are infeasible, unlike with
/// passwords.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented token against a stored hash in constant time.
#[must_use]
pub fn verify_token_hash(token: &str, stored_hash: &str) -> bool {
    let computed = hash_token(token);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_length() {
        // 32 bytes base64url without padding = 43 characters
        assert_eq!(generate_secure_token().len(), 43);
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_secure_token(), generate_secure_token());
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = hash_token("some-token");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic
        assert_eq!(hash, hash_token("some-token"));
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn test_verify_token_hash() {
        let token = generate_secure_token();
        let hash = hash_token(&token);

        assert!(verify_token_hash(&token, &hash));
        assert!(!verify_token_hash("different-token", &hash));
        assert!(!verify_token_hash(&token, "not-the-hash"));
    }
}
