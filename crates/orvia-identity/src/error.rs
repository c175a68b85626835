//! Error taxonomy for identity operations.
//!
//! Enumeration-sensitive distinctions (unknown email vs. wrong password,
//! expired vs. revoked API key) are collapsed before they cross the trust
//! boundary; the internal cause survives only in server-side logs.

use orvia_auth::AuthError;
use orvia_store::StoreError;
use thiserror::Error;

/// Identity operation error variants.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Malformed input; the caller's fault and safe to detail.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Primary-factor failure. Deliberately identical for unknown email and
    /// wrong password.
    #[error("Incorrect email or password")]
    IncorrectCredentials,

    /// Second-factor code did not verify. The challenge stays usable until
    /// its own expiry.
    #[error("Incorrect second-factor code")]
    IncorrectSecondFactorCode,

    /// Recovery code did not match an unused code.
    #[error("Incorrect recovery code")]
    IncorrectRecoveryCode,

    /// Challenge token is expired, already consumed, or unknown. A normal
    /// outcome: the caller restarts from the password step.
    #[error("Request expired")]
    RequestExpired,

    /// Too many failed attempts; retry after the lockout window.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Generic machine-credential or session failure. Deliberately does not
    /// distinguish missing, malformed, expired, or revoked.
    #[error("Authentication failed")]
    AuthFailure,

    /// A second factor is already active for the principal.
    #[error("Second factor already enabled")]
    SecondFactorAlreadyEnabled,

    /// No active second factor for the principal.
    #[error("Second factor not enabled")]
    SecondFactorNotEnabled,

    /// Second-factor verification attempted without a pending enrollment.
    #[error("Second factor enrollment not started")]
    EnrollmentNotStarted,

    /// The configured session strategy cannot perform this operation.
    #[error("Not supported by the {0} session strategy")]
    Unsupported(&'static str),

    /// Stored secret material could not be decrypted. Fatal and not
    /// user-facing; details stay in logs.
    #[error("Corrupt secret material")]
    CorruptSecret,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for IdentityError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::CorruptSecret(detail) => {
                tracing::error!(error = %detail, "Secret decryption failed");
                IdentityError::CorruptSecret
            }
            other => IdentityError::Internal(other.to_string()),
        }
    }
}

impl IdentityError {
    /// Whether this outcome is an expected part of the flow (caller
    /// retries or restarts) rather than a fault.
    #[must_use]
    pub fn is_expected_flow_outcome(&self) -> bool {
        matches!(
            self,
            IdentityError::IncorrectCredentials
                | IdentityError::IncorrectSecondFactorCode
                | IdentityError::IncorrectRecoveryCode
                | IdentityError::RequestExpired
                | IdentityError::RateLimitExceeded
                | IdentityError::AuthFailure
        )
    }
}
