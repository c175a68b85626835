//! Session configuration.
//!
//! Resolved once at process start and passed into [`SessionManager`] by the
//! composition root; strategy selection is an explicit deployment choice,
//! not an environment lookup buried in a call path.
//!
//! [`SessionManager`]: crate::services::sessions::SessionManager

use chrono::Duration;

/// Default lifetime of a stateless session token, in minutes.
///
/// Deliberately short: expiry is the only revocation mechanism the
/// stateless strategy has.
pub const STATELESS_TTL_MINUTES: i64 = 15;

/// Default lifetime of a revocable session, in hours.
pub const REVOCABLE_TTL_HOURS: i64 = 8;

/// How session tokens are issued and validated.
#[derive(Clone)]
pub enum SessionStrategy {
    /// Signed, self-contained token; validation needs no store round trip.
    /// `revoke`/`revoke_all` are unsupported — short expiry is the only
    /// mitigation, a documented limitation of this strategy.
    Stateless {
        /// HMAC signing key for the token signature.
        signing_key: Vec<u8>,
    },
    /// Opaque random token mapped to a server-side record; revocation
    /// deletes the record and takes effect immediately.
    Revocable,
}

impl SessionStrategy {
    /// Short name used in logs and `Unsupported` errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionStrategy::Stateless { .. } => "stateless",
            SessionStrategy::Revocable => "revocable",
        }
    }
}

impl std::fmt::Debug for SessionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStrategy::Stateless { .. } => f
                .debug_struct("Stateless")
                .field("signing_key", &"[REDACTED]")
                .finish(),
            SessionStrategy::Revocable => write!(f, "Revocable"),
        }
    }
}

/// Session issuance configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub strategy: SessionStrategy,
    /// Session lifetime from issuance (or from last validation, if
    /// sliding).
    pub ttl: Duration,
    /// Whether successful validation pushes the expiry forward.
    /// Only meaningful for the revocable strategy.
    pub sliding: bool,
}

impl SessionConfig {
    /// Stateless strategy with the default short lifetime.
    #[must_use]
    pub fn stateless(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            strategy: SessionStrategy::Stateless {
                signing_key: signing_key.into(),
            },
            ttl: Duration::minutes(STATELESS_TTL_MINUTES),
            sliding: false,
        }
    }

    /// Revocable strategy with the default lifetime and fixed expiry.
    #[must_use]
    pub fn revocable() -> Self {
        Self {
            strategy: SessionStrategy::Revocable,
            ttl: Duration::hours(REVOCABLE_TTL_HOURS),
            sliding: false,
        }
    }

    /// Override the session lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable sliding expiry.
    #[must_use]
    pub fn with_sliding_expiry(mut self) -> Self {
        self.sliding = true;
        self
    }
}
