//! Error types for credential primitives.

use thiserror::Error;

/// Credential primitive error variants.
///
/// Each variant maps to a specific failure mode; callers match exhaustively
/// instead of inspecting error strings.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Password hashing operation failed.
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// Password hash is not a valid PHC string.
    #[error("Invalid password hash format")]
    InvalidHashFormat,

    /// Encryption master key is not configured.
    #[error("Encryption master key not configured ({0} environment variable)")]
    KeyNotConfigured(&'static str),

    /// Stored ciphertext is malformed, truncated, or fails authentication.
    ///
    /// Decryption never falls back to returning garbage; any structural or
    /// cryptographic failure surfaces here.
    #[error("Corrupt secret: {0}")]
    CorruptSecret(String),

    /// TOTP instance construction failed (bad seed length).
    #[error("TOTP failure: {0}")]
    TotpFailed(String),
}

impl AuthError {
    /// Check whether this error indicates unreadable at-rest secret material.
    #[must_use]
    pub fn is_corrupt_secret(&self) -> bool {
        matches!(self, AuthError::CorruptSecret(_))
    }
}
