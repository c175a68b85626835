//! Machine-credential (API key) issuance and verification.
//!
//! Keys carry a recognizable prefix and fixed total length so garbage input
//! is rejected on shape alone, before any store lookup. Only the SHA-256
//! hash of a key is persisted; the plaintext is returned exactly once at
//! issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use orvia_auth::{generate_secure_token, hash_token};
use orvia_core::{ApiKeyId, TenantId};
use orvia_store::{ApiKeyRecord, ApiKeyStore};

use crate::error::IdentityError;

/// Prefix identifying orvia secret keys.
pub const API_KEY_PREFIX: &str = "orv_sk_";

/// Fixed total length of a plaintext key: prefix plus a 43-character
/// base64url suffix (32 random bytes).
pub const API_KEY_LENGTH: usize = API_KEY_PREFIX.len() + 43;

/// Minimum interval between `last_used_at` updates, in seconds.
///
/// Debouncing keeps usage tracking meaningful without a store write on
/// every request.
const LAST_USED_DEBOUNCE_SECS: i64 = 60;

/// Timeout for the spawned `last_used_at` update, in seconds.
const LAST_USED_UPDATE_TIMEOUT_SECS: u64 = 5;

/// The tenant identity a verified key resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyIdentity {
    pub key_id: ApiKeyId,
    pub tenant_id: TenantId,
}

/// Issues, verifies and revokes API keys.
#[derive(Clone)]
pub struct ApiKeyService {
    keys: Arc<dyn ApiKeyStore>,
}

impl ApiKeyService {
    #[must_use]
    pub fn new(keys: Arc<dyn ApiKeyStore>) -> Self {
        Self { keys }
    }

    /// Issue a new key for a tenant.
    ///
    /// Returns the stored record and the plaintext key. The plaintext is
    /// not reconstructible afterwards; hand it to the caller now or never.
    pub async fn issue(
        &self,
        tenant_id: TenantId,
        description: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(ApiKeyRecord, String), IdentityError> {
        let plaintext = format!("{API_KEY_PREFIX}{}", generate_secure_token());
        debug_assert_eq!(plaintext.len(), API_KEY_LENGTH);

        let record = ApiKeyRecord {
            id: ApiKeyId::new(),
            tenant_id,
            key_hash: hash_token(&plaintext),
            description: description.to_string(),
            expires_at,
            created_at: Utc::now(),
            last_used_at: None,
        };

        self.keys.insert_api_key(record.clone()).await?;

        tracing::info!(
            key_id = %record.id,
            tenant_id = %tenant_id,
            "API key issued"
        );

        Ok((record, plaintext))
    }

    /// Verify a presented key and resolve its tenant.
    ///
    /// Not-found and expired collapse to the same `AuthFailure`; which one
    /// it was is recorded only in logs, so the response cannot be used as a
    /// key-enumeration or expiry oracle.
    ///
    /// # Errors
    ///
    /// - `IdentityError::AuthFailure` for any unusable key
    /// - `IdentityError::Store` if the lookup itself fails
    pub async fn verify(&self, presented: &str) -> Result<ApiKeyIdentity, IdentityError> {
        // Shape is public knowledge; rejecting early skips a pointless
        // lookup and is not a timing oracle.
        if !Self::has_valid_shape(presented) {
            tracing::debug!("Rejected API key with invalid shape");
            return Err(IdentityError::AuthFailure);
        }

        let key_hash = hash_token(presented);
        let key = self
            .keys
            .find_api_key_by_hash(&key_hash)
            .await?
            .ok_or_else(|| {
                tracing::warn!("API key not found by hash");
                IdentityError::AuthFailure
            })?;

        let now = Utc::now();
        if key.is_expired(now) {
            tracing::warn!(key_id = %key.id, "Rejected expired API key");
            return Err(IdentityError::AuthFailure);
        }

        self.touch_last_used(&key, now);

        Ok(ApiKeyIdentity {
            key_id: key.id,
            tenant_id: key.tenant_id,
        })
    }

    /// Revoke a key. Immediate hard delete; there is no grace period.
    pub async fn revoke(&self, key_id: ApiKeyId) -> Result<bool, IdentityError> {
        let removed = self.keys.delete_api_key(key_id).await?;
        if removed {
            tracing::info!(key_id = %key_id, "API key revoked");
        }
        Ok(removed)
    }

    /// Update a key's description and expiry. The secret is immutable.
    pub async fn update_metadata(
        &self,
        key_id: ApiKeyId,
        description: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, IdentityError> {
        Ok(self
            .keys
            .update_api_key_metadata(key_id, description.to_string(), expires_at)
            .await?)
    }

    /// All keys of a tenant, creation order.
    pub async fn list(&self, tenant_id: TenantId) -> Result<Vec<ApiKeyRecord>, IdentityError> {
        Ok(self.keys.list_api_keys_for_tenant(tenant_id).await?)
    }

    /// Prefix and exact-length check. No allocation, no store access.
    #[must_use]
    pub fn has_valid_shape(presented: &str) -> bool {
        presented.len() == API_KEY_LENGTH && presented.starts_with(API_KEY_PREFIX)
    }

    /// Spawn a best-effort, debounced `last_used_at` update.
    ///
    /// Usage tracking is observability, not correctness: a failed or
    /// timed-out update never fails the authentication outcome.
    fn touch_last_used(&self, key: &ApiKeyRecord, now: DateTime<Utc>) {
        let should_update = key.last_used_at.is_none_or(|last_used| {
            (now - last_used).num_seconds() > LAST_USED_DEBOUNCE_SECS
        });
        if !should_update {
            return;
        }

        let keys = Arc::clone(&self.keys);
        let key_id = key.id;
        tokio::spawn(async move {
            let update = keys.touch_api_key(key_id, now);
            match tokio::time::timeout(
                std::time::Duration::from_secs(LAST_USED_UPDATE_TIMEOUT_SECS),
                update,
            )
            .await
            {
                Ok(Ok(())) => {
                    tracing::debug!(key_id = %key_id, "Updated API key last_used_at");
                }
                Ok(Err(e)) => {
                    tracing::warn!(key_id = %key_id, error = %e, "Failed to update API key last_used_at");
                }
                Err(_) => {
                    tracing::warn!(key_id = %key_id, "API key last_used_at update timed out");
                }
            }
        });
    }
}
