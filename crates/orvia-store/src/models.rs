//! Data models for the trust core's persistence collaborator.

use chrono::{DateTime, Duration, Utc};
use orvia_core::{ApiKeyId, ChallengeId, SessionId, TenantId, UserId, WebhookId};
use serde::{Deserialize, Serialize};

/// Minutes before an unverified second-factor enrollment expires.
pub const SECOND_FACTOR_SETUP_EXPIRY_MINUTES: i64 = 10;

/// A human principal.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: UserId,
    pub tenant_id: TenantId,
    /// Normalized (case-folded, trimmed) email; unique per tenant.
    pub email: String,
    /// PHC-formatted Argon2id hash. `None` for principals that only sign in
    /// through a federated identity and have no local password.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An enrolled (or pending) second-factor authenticator.
///
/// At most one record exists per principal; enrolling a new authenticator
/// replaces the old record once the new seed is verified.
#[derive(Debug, Clone)]
pub struct SecondFactor {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    /// Friendly label shown in security settings.
    pub label: String,
    /// TOTP seed, encrypted at rest (`ivHex:cipherHex`).
    pub seed_encrypted: String,
    /// False while the enrollment is pending proof of possession.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Consecutive failed code submissions since the last success.
    pub failed_attempts: i32,
    /// Lockout deadline after too many failures.
    pub locked_until: Option<DateTime<Utc>>,
    /// TOTP time step of the last accepted code, for replay rejection.
    pub last_used_step: Option<i64>,
}

impl SecondFactor {
    /// Whether the factor is locked out at the given instant.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Whether a pending (unverified) enrollment has expired.
    #[must_use]
    pub fn is_setup_expired(&self, now: DateTime<Utc>) -> bool {
        !self.enabled
            && now > self.created_at + Duration::minutes(SECOND_FACTOR_SETUP_EXPIRY_MINUTES)
    }
}

/// A server-side session record (revocable strategy).
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    /// SHA-256 hex hash of the opaque session token.
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the session is still usable at the given instant.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Second-factor submission kinds a challenge accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMethod {
    Totp,
    Recovery,
}

/// An ephemeral, single-use sign-in challenge.
///
/// Minted after primary-factor success when a second factor is required.
/// Consumption is atomic: the store guarantees [`consume`] returns `true`
/// exactly once per challenge.
///
/// [`consume`]: crate::repo::ChallengeStore::consume_challenge
#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    pub id: ChallengeId,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    /// SHA-256 hex hash of the opaque challenge token.
    pub token_hash: String,
    /// Acceptable next actions for this challenge.
    pub methods: Vec<ChallengeMethod>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ChallengeRecord {
    /// Whether the challenge can still be submitted against.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}

/// A machine credential for a tenant.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: ApiKeyId,
    pub tenant_id: TenantId,
    /// SHA-256 hex hash of the full plaintext key. The plaintext is not
    /// reconstructible from anything stored server-side.
    pub key_hash: String,
    pub description: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    /// Whether the key has passed its configured expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// A tenant-configured webhook destination.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: WebhookId,
    pub tenant_id: TenantId,
    pub url: String,
    /// Signing secret, encrypted at rest. `None` means deliveries to this
    /// destination are unsigned (explicit lower-trust mode).
    pub secret_encrypted: Option<String>,
    /// Trigger kinds this destination subscribes to.
    pub triggers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether this destination subscribes to the given trigger.
    #[must_use]
    pub fn subscribes_to(&self, trigger: &str) -> bool {
        self.triggers.iter().any(|t| t == trigger)
    }
}
