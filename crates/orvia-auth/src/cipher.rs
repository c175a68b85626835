//! Symmetric encryption of at-rest secrets using AES-256-GCM.
//!
//! Webhook signing secrets and TOTP seeds are stored encrypted under a key
//! derived from an operator-supplied master key. The master key may be of
//! arbitrary length (human-memorable passphrases included); a SHA-256
//! digest turns it into the fixed 32-byte AES key.
//!
//! Ciphertext format is the self-describing two-part value
//! `ivHex:cipherHex` — hex-encoded random nonce, a colon, then the
//! hex-encoded ciphertext with the GCM authentication tag appended. The
//! nonce is not secret; embedding it lets `decrypt` operate without any
//! side-channel state.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Size of the GCM nonce in bytes (96 bits).
const NONCE_SIZE: usize = 12;

/// Environment variable holding the master key.
const MASTER_KEY_ENV: &str = "ORVIA_MASTER_KEY";

/// Encrypts and decrypts at-rest secrets.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Create a cipher from an operator-supplied master key of any length.
    #[must_use]
    pub fn new(master_key: &str) -> Self {
        let key = Sha256::digest(master_key.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .expect("SHA-256 digest is a valid AES-256 key");

        Self { cipher }
    }

    /// Create a cipher from the `ORVIA_MASTER_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyNotConfigured` if the variable is unset.
    pub fn from_env() -> Result<Self, AuthError> {
        let master_key = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| AuthError::KeyNotConfigured(MASTER_KEY_ENV))?;

        Ok(Self::new(master_key.trim()))
    }

    /// Encrypt a plaintext secret into the `ivHex:cipherHex` format.
    ///
    /// Every call draws a fresh random nonce, so encrypting the same
    /// plaintext twice produces different ciphertexts.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("AES-GCM encryption is infallible for in-memory buffers");

        format!("{}:{}", hex::encode(nonce_bytes), hex::encode(ciphertext))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CorruptSecret` for any malformed or truncated
    /// input: missing separator, non-hex content, wrong nonce length, or a
    /// ciphertext that fails GCM authentication (wrong key or tampering).
    pub fn decrypt(&self, stored: &str) -> Result<Vec<u8>, AuthError> {
        let (iv_hex, cipher_hex) = stored
            .split_once(':')
            .ok_or_else(|| AuthError::CorruptSecret("missing separator".to_string()))?;

        let nonce_bytes = hex::decode(iv_hex)
            .map_err(|e| AuthError::CorruptSecret(format!("bad nonce encoding: {e}")))?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(AuthError::CorruptSecret(format!(
                "nonce length {} (expected {NONCE_SIZE})",
                nonce_bytes.len()
            )));
        }

        let ciphertext = hex::decode(cipher_hex)
            .map_err(|e| AuthError::CorruptSecret(format!("bad ciphertext encoding: {e}")))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| AuthError::CorruptSecret("authentication failed".to_string()))
    }

    /// Decrypt a value and interpret it as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CorruptSecret` if decryption fails or the
    /// plaintext is not valid UTF-8.
    pub fn decrypt_string(&self, stored: &str) -> Result<String, AuthError> {
        let plaintext = self.decrypt(stored)?;
        String::from_utf8(plaintext)
            .map_err(|_| AuthError::CorruptSecret("plaintext is not UTF-8".to_string()))
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}
