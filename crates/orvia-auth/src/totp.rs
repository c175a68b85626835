//! TOTP seed generation and code verification.
//!
//! Codes are 6 digits over a 30-second step with ±1 step of clock-skew
//! tolerance, matching what authenticator apps produce by default.

use totp_rs::{Algorithm, TOTP};

use crate::error::AuthError;

/// Number of digits in a generated code.
pub const TOTP_DIGITS: usize = 6;

/// TOTP time step in seconds.
pub const TOTP_STEP_SECONDS: u64 = 30;

/// Seed length in bytes (160 bits).
const SEED_LENGTH: usize = 20;

/// Generate a new random TOTP seed.
#[must_use]
pub fn generate_seed() -> Vec<u8> {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut seed = vec![0u8; SEED_LENGTH];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Base32-encode a seed for manual entry in an authenticator app.
#[must_use]
pub fn seed_base32(seed: &[u8]) -> String {
    data_encoding::BASE32_NOPAD.encode(seed)
}

/// Verifies TOTP codes against a raw seed.
#[derive(Debug, Clone)]
pub struct TotpVerifier {
    issuer: String,
}

impl TotpVerifier {
    /// Create a verifier labelling provisioning URIs with the given issuer.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Build the `otpauth://` provisioning URI for an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TotpFailed` if the seed is too short.
    pub fn provisioning_uri(&self, seed: &[u8], account: &str) -> Result<String, AuthError> {
        let totp = self.build(seed, Some(account))?;
        Ok(totp.get_url())
    }

    /// Check a submitted code against the seed at the current time.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TotpFailed` if the seed is too short.
    pub fn check(&self, seed: &[u8], code: &str) -> Result<bool, AuthError> {
        let totp = self.build(seed, None)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    fn build(&self, seed: &[u8], account: Option<&str>) -> Result<TOTP, AuthError> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            1, // ±1 step tolerance
            TOTP_STEP_SECONDS,
            seed.to_vec(),
            account.map(|_| self.issuer.clone()),
            account.unwrap_or_default().to_string(),
        )
        .map_err(|e| AuthError::TotpFailed(e.to_string()))
    }
}

/// The TOTP time step the given Unix timestamp falls into.
///
/// Used to reject replays of a code within its validity window.
#[must_use]
pub fn time_step(unix_seconds: i64) -> i64 {
    unix_seconds / TOTP_STEP_SECONDS as i64
}
