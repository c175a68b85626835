//! Second-factor (TOTP) enrollment and recovery codes.
//!
//! Enrollment is a two-step protocol: `enroll_begin` stores the encrypted
//! seed in a pending state, and the factor only becomes active once
//! `enroll_verify` proves the caller's authenticator produces valid codes.
//! A principal has at most one factor record; replacing an active
//! authenticator is an explicit disable followed by a fresh enrollment.

use std::sync::Arc;

use chrono::Utc;
use orvia_auth::{generate_seed, hash_token, seed_base32, SecretCipher, TotpVerifier};
use orvia_core::{TenantId, UserId};
use orvia_store::{SecondFactor, SecondFactorStore};
use rand::rngs::OsRng;
use rand::Rng;

use crate::error::IdentityError;

/// Number of recovery codes issued per enrollment.
pub const RECOVERY_CODE_COUNT: usize = 10;

/// Length of a recovery code in characters.
const RECOVERY_CODE_LENGTH: usize = 16;

/// Alphabet for recovery codes. Excludes 0/O/1/I to keep hand-typed codes
/// unambiguous.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Data handed to the user when enrollment starts.
#[derive(Debug)]
pub struct EnrollmentStart {
    /// Base32 seed for manual entry.
    pub secret_base32: String,
    /// `otpauth://` URI for QR provisioning.
    pub otpauth_uri: String,
}

/// A principal's second-factor state.
#[derive(Debug)]
pub struct SecondFactorStatus {
    pub enabled: bool,
    pub label: Option<String>,
    pub recovery_codes_remaining: usize,
}

/// Manages second-factor enrollment, removal and recovery codes.
#[derive(Clone)]
pub struct SecondFactorService {
    factors: Arc<dyn SecondFactorStore>,
    cipher: SecretCipher,
    totp: TotpVerifier,
}

impl SecondFactorService {
    #[must_use]
    pub fn new(factors: Arc<dyn SecondFactorStore>, cipher: SecretCipher, issuer: &str) -> Self {
        Self {
            factors,
            cipher,
            totp: TotpVerifier::new(issuer),
        }
    }

    /// Start enrollment: generate a seed, store it encrypted and pending,
    /// and return the provisioning material.
    ///
    /// A half-finished enrollment is simply replaced and restarted.
    /// Replacing an *active* authenticator goes through an explicit
    /// `disable` first, so an enrollment that is never verified cannot
    /// silently strip the principal's second factor.
    ///
    /// # Errors
    ///
    /// `IdentityError::SecondFactorAlreadyEnabled` if a factor is active.
    pub async fn enroll_begin(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        email: &str,
        label: &str,
    ) -> Result<EnrollmentStart, IdentityError> {
        if let Some(existing) = self.factors.find_factor(user_id).await? {
            if existing.enabled {
                return Err(IdentityError::SecondFactorAlreadyEnabled);
            }
        }

        let seed = generate_seed();
        let secret_base32 = seed_base32(&seed);
        let otpauth_uri = self.totp.provisioning_uri(&seed, email)?;

        self.factors
            .upsert_factor(SecondFactor {
                user_id,
                tenant_id,
                label: label.to_string(),
                seed_encrypted: self.cipher.encrypt(&seed),
                enabled: false,
                created_at: Utc::now(),
                failed_attempts: 0,
                locked_until: None,
                last_used_step: None,
            })
            .await?;

        tracing::info!(user_id = %user_id, "Second-factor enrollment started");

        Ok(EnrollmentStart {
            secret_base32,
            otpauth_uri,
        })
    }

    /// Prove possession of the seed and activate the factor.
    ///
    /// Returns the principal's fresh recovery codes — shown once, stored
    /// hashed.
    ///
    /// # Errors
    ///
    /// - `IdentityError::EnrollmentNotStarted` without a pending record
    /// - `IdentityError::SecondFactorAlreadyEnabled` if already active
    /// - `IdentityError::RequestExpired` if the pending enrollment lapsed
    /// - `IdentityError::IncorrectSecondFactorCode` on a bad code
    pub async fn enroll_verify(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<Vec<String>, IdentityError> {
        let factor = self
            .factors
            .find_factor(user_id)
            .await?
            .ok_or(IdentityError::EnrollmentNotStarted)?;

        if factor.enabled {
            return Err(IdentityError::SecondFactorAlreadyEnabled);
        }

        let now = Utc::now();
        if factor.is_setup_expired(now) {
            self.factors.delete_factor(user_id).await?;
            return Err(IdentityError::RequestExpired);
        }

        let seed = self.cipher.decrypt(&factor.seed_encrypted)?;
        if !self.totp.check(&seed, code)? {
            return Err(IdentityError::IncorrectSecondFactorCode);
        }

        self.factors.enable_factor(user_id).await?;

        let (codes, hashes) = generate_recovery_codes();
        self.factors
            .replace_recovery_codes(user_id, hashes)
            .await?;

        tracing::info!(user_id = %user_id, "Second factor enabled");

        Ok(codes)
    }

    /// Disable the factor and discard all recovery codes.
    pub async fn disable(&self, user_id: UserId) -> Result<bool, IdentityError> {
        let removed = self.factors.delete_factor(user_id).await?;
        if removed {
            tracing::info!(user_id = %user_id, "Second factor disabled");
        }
        Ok(removed)
    }

    /// The principal's current second-factor state.
    pub async fn status(&self, user_id: UserId) -> Result<SecondFactorStatus, IdentityError> {
        let factor = self.factors.find_factor(user_id).await?;
        let enabled = factor.as_ref().is_some_and(|f| f.enabled);
        let recovery_codes_remaining = if enabled {
            self.factors.count_unused_recovery_codes(user_id).await?
        } else {
            0
        };

        Ok(SecondFactorStatus {
            enabled,
            label: factor.filter(|f| f.enabled).map(|f| f.label),
            recovery_codes_remaining,
        })
    }

    /// Replace the principal's recovery codes with a fresh batch.
    ///
    /// # Errors
    ///
    /// `IdentityError::SecondFactorNotEnabled` without an active factor.
    pub async fn regenerate_recovery_codes(
        &self,
        user_id: UserId,
    ) -> Result<Vec<String>, IdentityError> {
        let factor = self
            .factors
            .find_factor(user_id)
            .await?
            .filter(|f| f.enabled)
            .ok_or(IdentityError::SecondFactorNotEnabled)?;

        let (codes, hashes) = generate_recovery_codes();
        self.factors
            .replace_recovery_codes(factor.user_id, hashes)
            .await?;

        tracing::info!(user_id = %user_id, "Recovery codes regenerated");

        Ok(codes)
    }
}

/// Normalize a hand-typed recovery code: strip separators, uppercase.
#[must_use]
pub(crate) fn normalize_recovery_code(code: &str) -> String {
    code.replace(['-', ' '], "").to_uppercase()
}

/// Hash a normalized recovery code for storage and lookup.
#[must_use]
pub(crate) fn hash_recovery_code(normalized: &str) -> String {
    hash_token(normalized)
}

/// Generate a batch of recovery codes, returning (plaintexts, hashes).
fn generate_recovery_codes() -> (Vec<String>, Vec<String>) {
    let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
    let mut hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);

    for _ in 0..RECOVERY_CODE_COUNT {
        let code: String = (0..RECOVERY_CODE_LENGTH)
            .map(|_| {
                let idx = OsRng.gen_range(0..RECOVERY_CODE_ALPHABET.len());
                RECOVERY_CODE_ALPHABET[idx] as char
            })
            .collect();
        hashes.push(hash_recovery_code(&code));
        codes.push(code);
    }

    (codes, hashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_code_batch_shape() {
        let (codes, hashes) = generate_recovery_codes();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        assert_eq!(hashes.len(), RECOVERY_CODE_COUNT);

        for (code, hash) in codes.iter().zip(&hashes) {
            assert_eq!(code.len(), RECOVERY_CODE_LENGTH);
            assert!(code
                .bytes()
                .all(|b| RECOVERY_CODE_ALPHABET.contains(&b)));
            assert_eq!(&hash_recovery_code(code), hash);
        }
    }

    #[test]
    fn test_recovery_codes_are_unique() {
        let (codes, _) = generate_recovery_codes();
        let mut deduped = codes.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), codes.len());
    }

    #[test]
    fn test_normalize_recovery_code() {
        assert_eq!(
            normalize_recovery_code("abcd-efgh jklm-npqr"),
            "ABCDEFGHJKLMNPQR"
        );
    }

    #[test]
    fn test_normalized_code_hash_matches() {
        let (codes, hashes) = generate_recovery_codes();
        let sloppy = format!(
            " {}-{} ",
            &codes[0][..8].to_lowercase(),
            &codes[0][8..].to_lowercase()
        );
        assert_eq!(hash_recovery_code(&normalize_recovery_code(&sloppy)), hashes[0]);
    }
}
