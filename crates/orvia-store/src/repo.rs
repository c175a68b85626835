//! Repository traits the trust core programs against.
//!
//! Implementations must enforce uniqueness constraints themselves (the
//! callers never take application-level locks) and must make
//! [`ChallengeStore::consume`] an atomic check-and-mark.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orvia_core::{ApiKeyId, ChallengeId, SessionId, TenantId, UserId, WebhookId};

use crate::error::StoreError;
use crate::models::{
    ApiKeyRecord, ChallengeRecord, Principal, SecondFactor, SessionRecord, Webhook,
};

/// Principal lookup and lifecycle.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Insert a principal. Fails with `Conflict` if the normalized email is
    /// already registered for the tenant.
    async fn create_principal(&self, principal: Principal) -> Result<(), StoreError>;

    /// Look up by normalized email within a tenant.
    async fn find_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<Principal>, StoreError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<Principal>, StoreError>;

    /// Replace the stored password hash (password change/reset).
    async fn set_password_hash(
        &self,
        user_id: UserId,
        password_hash: Option<String>,
    ) -> Result<(), StoreError>;

    /// Delete the principal. Session and credential cleanup is the
    /// caller's responsibility.
    async fn delete_principal(&self, user_id: UserId) -> Result<bool, StoreError>;
}

/// Second-factor enrollment state and recovery codes.
#[async_trait]
pub trait SecondFactorStore: Send + Sync {
    /// Insert or replace the principal's factor record.
    async fn upsert_factor(&self, factor: SecondFactor) -> Result<(), StoreError>;

    async fn find_factor(&self, user_id: UserId) -> Result<Option<SecondFactor>, StoreError>;

    /// Mark the pending factor as verified and active.
    async fn enable_factor(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Remove the factor and all recovery codes.
    async fn delete_factor(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Increment the failure counter; lock the factor until `locked_until`
    /// once `max_attempts` is reached. Returns the new counter value.
    async fn record_factor_failure(
        &self,
        user_id: UserId,
        max_attempts: i32,
        locked_until: DateTime<Utc>,
    ) -> Result<i32, StoreError>;

    /// Reset the failure counter and record the accepted TOTP time step.
    async fn record_factor_success(
        &self,
        user_id: UserId,
        used_step: Option<i64>,
    ) -> Result<(), StoreError>;

    /// Replace the principal's recovery codes with a fresh hashed batch.
    async fn replace_recovery_codes(
        &self,
        user_id: UserId,
        code_hashes: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Atomically consume an unused recovery code matching the hash.
    /// Returns `false` if no unused code matches.
    async fn consume_recovery_code(
        &self,
        user_id: UserId,
        code_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Count the principal's remaining unused recovery codes.
    async fn count_unused_recovery_codes(&self, user_id: UserId) -> Result<usize, StoreError>;
}

/// Server-side session records (revocable strategy).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session. Fails with `Conflict` on a duplicate token hash.
    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Push the expiry forward (sliding expiry) and update `last_seen_at`.
    async fn touch_session(
        &self,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn delete_session(&self, session_id: SessionId) -> Result<bool, StoreError>;

    /// Delete every session of the principal. Returns the count removed.
    async fn delete_all_for_principal(&self, user_id: UserId) -> Result<u64, StoreError>;

    /// Delete every session of the principal except one. Returns the count
    /// removed.
    async fn delete_all_except(
        &self,
        user_id: UserId,
        keep: SessionId,
    ) -> Result<u64, StoreError>;

    /// All unexpired sessions of the principal, oldest first.
    async fn list_active_for_principal(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SessionRecord>, StoreError>;
}

/// Ephemeral sign-in challenges.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert_challenge(&self, challenge: ChallengeRecord) -> Result<(), StoreError>;

    async fn find_challenge_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ChallengeRecord>, StoreError>;

    /// Atomically mark the challenge consumed if it is unconsumed and
    /// unexpired at `now`. Exactly one concurrent caller observes `true`.
    async fn consume_challenge(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Remove expired challenges. Storage hygiene only; correctness never
    /// depends on this running.
    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Machine credentials.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Insert a key. Fails with `Conflict` on a duplicate hash.
    async fn insert_api_key(&self, key: ApiKeyRecord) -> Result<(), StoreError>;

    async fn find_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKeyRecord>, StoreError>;

    /// Best-effort usage timestamp update.
    async fn touch_api_key(
        &self,
        key_id: ApiKeyId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Update description and expiry. The secret hash is immutable.
    async fn update_api_key_metadata(
        &self,
        key_id: ApiKeyId,
        description: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Hard delete (revocation). There is no soft-revoke grace period.
    async fn delete_api_key(&self, key_id: ApiKeyId) -> Result<bool, StoreError>;

    /// All keys of a tenant, creation order.
    async fn list_api_keys_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ApiKeyRecord>, StoreError>;
}

/// Tenant webhook configuration.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert_webhook(&self, webhook: Webhook) -> Result<(), StoreError>;

    async fn update_webhook(&self, webhook: Webhook) -> Result<bool, StoreError>;

    async fn delete_webhook(&self, webhook_id: WebhookId) -> Result<bool, StoreError>;

    /// Destinations of the tenant subscribed to the trigger, creation order.
    async fn find_by_tenant_and_trigger(
        &self,
        tenant_id: TenantId,
        trigger: &str,
    ) -> Result<Vec<Webhook>, StoreError>;

    /// All destinations of the tenant, creation order.
    async fn list_webhooks_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<Webhook>, StoreError>;
}
