//! In-memory store implementation.
//!
//! Backs the test suite and embedded deployments. All maps live behind a
//! single `RwLock`; writes are short and never held across an await point,
//! which is what makes [`ChallengeStore::consume`] and
//! [`SecondFactorStore::consume_recovery_code`] atomic.
//!
//! [`ChallengeStore::consume`]: crate::repo::ChallengeStore::consume_challenge
//! [`SecondFactorStore::consume_recovery_code`]: crate::repo::SecondFactorStore::consume_recovery_code

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orvia_core::{ApiKeyId, ChallengeId, SessionId, TenantId, UserId, WebhookId};

use crate::error::StoreError;
use crate::models::{
    ApiKeyRecord, ChallengeRecord, Principal, SecondFactor, SessionRecord, Webhook,
};
use crate::repo::{
    ApiKeyStore, ChallengeStore, PrincipalStore, SecondFactorStore, SessionStore, WebhookStore,
};

#[derive(Debug, Clone)]
struct RecoveryCodeEntry {
    code_hash: String,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    principals: HashMap<UserId, Principal>,
    emails: HashMap<(TenantId, String), UserId>,
    factors: HashMap<UserId, SecondFactor>,
    recovery_codes: HashMap<UserId, Vec<RecoveryCodeEntry>>,
    sessions: HashMap<SessionId, SessionRecord>,
    session_hashes: HashMap<String, SessionId>,
    challenges: HashMap<ChallengeId, ChallengeRecord>,
    challenge_hashes: HashMap<String, ChallengeId>,
    api_keys: HashMap<ApiKeyId, ApiKeyRecord>,
    api_key_hashes: HashMap<String, ApiKeyId>,
    webhooks: HashMap<WebhookId, Webhook>,
}

/// In-memory implementation of every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap()
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn create_principal(&self, principal: Principal) -> Result<(), StoreError> {
        let mut inner = self.write();
        let email_key = (principal.tenant_id, principal.email.clone());
        if inner.emails.contains_key(&email_key) {
            return Err(StoreError::Conflict(format!(
                "email already registered for tenant {}",
                principal.tenant_id
            )));
        }
        inner.emails.insert(email_key, principal.id);
        inner.principals.insert(principal.id, principal);
        Ok(())
    }

    async fn find_by_email(
        &self,
        tenant_id: TenantId,
        email: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let inner = self.read();
        let id = inner.emails.get(&(tenant_id, email.to_string()));
        Ok(id.and_then(|id| inner.principals.get(id)).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<Principal>, StoreError> {
        Ok(self.read().principals.get(&user_id).cloned())
    }

    async fn set_password_hash(
        &self,
        user_id: UserId,
        password_hash: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let principal = inner
            .principals
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound)?;
        principal.password_hash = password_hash;
        Ok(())
    }

    async fn delete_principal(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut inner = self.write();
        match inner.principals.remove(&user_id) {
            Some(principal) => {
                inner
                    .emails
                    .remove(&(principal.tenant_id, principal.email));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SecondFactorStore for MemoryStore {
    async fn upsert_factor(&self, factor: SecondFactor) -> Result<(), StoreError> {
        self.write().factors.insert(factor.user_id, factor);
        Ok(())
    }

    async fn find_factor(&self, user_id: UserId) -> Result<Option<SecondFactor>, StoreError> {
        Ok(self.read().factors.get(&user_id).cloned())
    }

    async fn enable_factor(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut inner = self.write();
        match inner.factors.get_mut(&user_id) {
            Some(factor) => {
                factor.enabled = true;
                factor.failed_attempts = 0;
                factor.locked_until = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_factor(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut inner = self.write();
        inner.recovery_codes.remove(&user_id);
        Ok(inner.factors.remove(&user_id).is_some())
    }

    async fn record_factor_failure(
        &self,
        user_id: UserId,
        max_attempts: i32,
        locked_until: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut inner = self.write();
        let factor = inner.factors.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        factor.failed_attempts += 1;
        if factor.failed_attempts >= max_attempts {
            factor.locked_until = Some(locked_until);
        }
        Ok(factor.failed_attempts)
    }

    async fn record_factor_success(
        &self,
        user_id: UserId,
        used_step: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let factor = inner.factors.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        factor.failed_attempts = 0;
        factor.locked_until = None;
        if used_step.is_some() {
            factor.last_used_step = used_step;
        }
        Ok(())
    }

    async fn replace_recovery_codes(
        &self,
        user_id: UserId,
        code_hashes: Vec<String>,
    ) -> Result<(), StoreError> {
        let entries = code_hashes
            .into_iter()
            .map(|code_hash| RecoveryCodeEntry {
                code_hash,
                used_at: None,
            })
            .collect();
        self.write().recovery_codes.insert(user_id, entries);
        Ok(())
    }

    async fn consume_recovery_code(
        &self,
        user_id: UserId,
        code_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write();
        let Some(entries) = inner.recovery_codes.get_mut(&user_id) else {
            return Ok(false);
        };
        match entries
            .iter_mut()
            .find(|e| e.used_at.is_none() && e.code_hash == code_hash)
        {
            Some(entry) => {
                entry.used_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_unused_recovery_codes(&self, user_id: UserId) -> Result<usize, StoreError> {
        Ok(self
            .read()
            .recovery_codes
            .get(&user_id)
            .map(|entries| entries.iter().filter(|e| e.used_at.is_none()).count())
            .unwrap_or(0))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.session_hashes.contains_key(&session.token_hash) {
            return Err(StoreError::Conflict("duplicate session token".to_string()));
        }
        inner
            .session_hashes
            .insert(session.token_hash.clone(), session.id);
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let inner = self.read();
        let id = inner.session_hashes.get(token_hash);
        Ok(id.and_then(|id| inner.sessions.get(id)).cloned())
    }

    async fn touch_session(
        &self,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound)?;
        session.expires_at = expires_at;
        session.last_seen_at = Utc::now();
        Ok(())
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<bool, StoreError> {
        let mut inner = self.write();
        match inner.sessions.remove(&session_id) {
            Some(session) => {
                inner.session_hashes.remove(&session.token_hash);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_all_for_principal(&self, user_id: UserId) -> Result<u64, StoreError> {
        let mut inner = self.write();
        let doomed: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            if let Some(session) = inner.sessions.remove(id) {
                inner.session_hashes.remove(&session.token_hash);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn delete_all_except(
        &self,
        user_id: UserId,
        keep: SessionId,
    ) -> Result<u64, StoreError> {
        let mut inner = self.write();
        let doomed: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.id != keep)
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            if let Some(session) = inner.sessions.remove(id) {
                inner.session_hashes.remove(&session.token_hash);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn list_active_for_principal(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let now = Utc::now();
        let mut sessions: Vec<SessionRecord> = self
            .read()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active(now))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn insert_challenge(&self, challenge: ChallengeRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.challenge_hashes.contains_key(&challenge.token_hash) {
            return Err(StoreError::Conflict(
                "duplicate challenge token".to_string(),
            ));
        }
        inner
            .challenge_hashes
            .insert(challenge.token_hash.clone(), challenge.id);
        inner.challenges.insert(challenge.id, challenge);
        Ok(())
    }

    async fn find_challenge_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ChallengeRecord>, StoreError> {
        let inner = self.read();
        let id = inner.challenge_hashes.get(token_hash);
        Ok(id.and_then(|id| inner.challenges.get(id)).cloned())
    }

    async fn consume_challenge(
        &self,
        challenge_id: ChallengeId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Check-and-mark under the write lock: exactly one caller wins.
        let mut inner = self.write();
        match inner.challenges.get_mut(&challenge_id) {
            Some(challenge) if challenge.is_usable(now) => {
                challenge.consumed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.write();
        let doomed: Vec<ChallengeId> = inner
            .challenges
            .values()
            .filter(|c| c.expires_at <= now || c.consumed_at.is_some())
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            if let Some(challenge) = inner.challenges.remove(id) {
                inner.challenge_hashes.remove(&challenge.token_hash);
            }
        }
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert_api_key(&self, key: ApiKeyRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.api_key_hashes.contains_key(&key.key_hash) {
            return Err(StoreError::Conflict("duplicate key hash".to_string()));
        }
        inner.api_key_hashes.insert(key.key_hash.clone(), key.id);
        inner.api_keys.insert(key.id, key);
        Ok(())
    }

    async fn find_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKeyRecord>, StoreError> {
        let inner = self.read();
        let id = inner.api_key_hashes.get(key_hash);
        Ok(id.and_then(|id| inner.api_keys.get(id)).cloned())
    }

    async fn touch_api_key(
        &self,
        key_id: ApiKeyId,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let key = inner.api_keys.get_mut(&key_id).ok_or(StoreError::NotFound)?;
        key.last_used_at = Some(used_at);
        Ok(())
    }

    async fn update_api_key_metadata(
        &self,
        key_id: ApiKeyId,
        description: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write();
        match inner.api_keys.get_mut(&key_id) {
            Some(key) => {
                key.description = description;
                key.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_api_key(&self, key_id: ApiKeyId) -> Result<bool, StoreError> {
        let mut inner = self.write();
        match inner.api_keys.remove(&key_id) {
            Some(key) => {
                inner.api_key_hashes.remove(&key.key_hash);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_api_keys_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ApiKeyRecord>, StoreError> {
        let mut keys: Vec<ApiKeyRecord> = self
            .read()
            .api_keys
            .values()
            .filter(|k| k.tenant_id == tenant_id)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.created_at);
        Ok(keys)
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn insert_webhook(&self, webhook: Webhook) -> Result<(), StoreError> {
        self.write().webhooks.insert(webhook.id, webhook);
        Ok(())
    }

    async fn update_webhook(&self, webhook: Webhook) -> Result<bool, StoreError> {
        let mut inner = self.write();
        match inner.webhooks.get_mut(&webhook.id) {
            Some(existing) => {
                *existing = webhook;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_webhook(&self, webhook_id: WebhookId) -> Result<bool, StoreError> {
        Ok(self.write().webhooks.remove(&webhook_id).is_some())
    }

    async fn find_by_tenant_and_trigger(
        &self,
        tenant_id: TenantId,
        trigger: &str,
    ) -> Result<Vec<Webhook>, StoreError> {
        let mut webhooks: Vec<Webhook> = self
            .read()
            .webhooks
            .values()
            .filter(|w| w.tenant_id == tenant_id && w.subscribes_to(trigger))
            .cloned()
            .collect();
        webhooks.sort_by_key(|w| w.created_at);
        Ok(webhooks)
    }

    async fn list_webhooks_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<Webhook>, StoreError> {
        let mut webhooks: Vec<Webhook> = self
            .read()
            .webhooks
            .values()
            .filter(|w| w.tenant_id == tenant_id)
            .cloned()
            .collect();
        webhooks.sort_by_key(|w| w.created_at);
        Ok(webhooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn principal(tenant_id: TenantId, email: &str) -> Principal {
        Principal {
            id: UserId::new(),
            tenant_id,
            email: email.to_string(),
            password_hash: Some("$argon2id$stub".to_string()),
            created_at: Utc::now(),
        }
    }

    fn session(user_id: UserId, token_hash: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: SessionId::new(),
            user_id,
            tenant_id: TenantId::new(),
            token_hash: token_hash.to_string(),
            created_at: now,
            expires_at: now + Duration::hours(8),
            last_seen_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_email_per_tenant_conflicts() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();

        store
            .create_principal(principal(tenant, "alice@example.com"))
            .await
            .unwrap();
        let err = store
            .create_principal(principal(tenant, "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Same email under a different tenant is fine
        store
            .create_principal(principal(TenantId::new(), "alice@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleting_principal_frees_email() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();
        let p = principal(tenant, "bob@example.com");
        let id = p.id;

        store.create_principal(p).await.unwrap();
        assert!(store.delete_principal(id).await.unwrap());
        assert!(store
            .find_by_email(tenant, "bob@example.com")
            .await
            .unwrap()
            .is_none());

        store
            .create_principal(principal(tenant, "bob@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_all_except_keeps_one() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let keep = session(user, "hash-keep");
        let keep_id = keep.id;
        store.insert_session(keep).await.unwrap();
        store.insert_session(session(user, "hash-a")).await.unwrap();
        store.insert_session(session(user, "hash-b")).await.unwrap();
        // Another principal's session is untouched
        store
            .insert_session(session(UserId::new(), "hash-other"))
            .await
            .unwrap();

        let removed = store.delete_all_except(user, keep_id).await.unwrap();
        assert_eq!(removed, 2);

        let remaining = store.list_active_for_principal(user).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep_id);
        assert!(store.find_by_token_hash("hash-other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn challenge_consumes_exactly_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let challenge = ChallengeRecord {
            id: ChallengeId::new(),
            user_id: UserId::new(),
            tenant_id: TenantId::new(),
            token_hash: "challenge-hash".to_string(),
            methods: vec![crate::models::ChallengeMethod::Totp],
            created_at: now,
            expires_at: now + Duration::minutes(5),
            consumed_at: None,
        };
        let id = challenge.id;
        store.insert_challenge(challenge).await.unwrap();

        assert!(store.consume_challenge(id, now).await.unwrap());
        assert!(!store.consume_challenge(id, now).await.unwrap());
    }

    #[tokio::test]
    async fn expired_challenge_cannot_be_consumed() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let challenge = ChallengeRecord {
            id: ChallengeId::new(),
            user_id: UserId::new(),
            tenant_id: TenantId::new(),
            token_hash: "stale-hash".to_string(),
            methods: vec![crate::models::ChallengeMethod::Totp],
            created_at: now - Duration::minutes(10),
            expires_at: now - Duration::minutes(5),
            consumed_at: None,
        };
        let id = challenge.id;
        store.insert_challenge(challenge).await.unwrap();

        assert!(!store.consume_challenge(id, now).await.unwrap());
    }

    #[tokio::test]
    async fn recovery_code_single_use() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store
            .replace_recovery_codes(user, vec!["hash-1".to_string(), "hash-2".to_string()])
            .await
            .unwrap();

        assert!(store.consume_recovery_code(user, "hash-1").await.unwrap());
        assert!(!store.consume_recovery_code(user, "hash-1").await.unwrap());
        assert_eq!(store.count_unused_recovery_codes(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_removes_expired_and_consumed() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for (hash, expires, consumed) in [
            ("live", now + Duration::minutes(5), None),
            ("stale", now - Duration::minutes(1), None),
            ("used", now + Duration::minutes(5), Some(now)),
        ] {
            store
                .insert_challenge(ChallengeRecord {
                    id: ChallengeId::new(),
                    user_id: UserId::new(),
                    tenant_id: TenantId::new(),
                    token_hash: hash.to_string(),
                    methods: vec![crate::models::ChallengeMethod::Recovery],
                    created_at: now - Duration::minutes(2),
                    expires_at: expires,
                    consumed_at: consumed,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.purge_expired_challenges(now).await.unwrap(), 2);
        assert!(store
            .find_challenge_by_token_hash("live")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_challenge_by_token_hash("stale")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn webhook_trigger_resolution_is_creation_ordered() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();
        let base = Utc::now();

        for (i, triggers) in [
            vec!["contact.created".to_string()],
            vec!["contact.created".to_string(), "deal.won".to_string()],
            vec!["deal.won".to_string()],
        ]
        .into_iter()
        .enumerate()
        {
            store
                .insert_webhook(Webhook {
                    id: WebhookId::new(),
                    tenant_id: tenant,
                    url: format!("https://example.com/hook/{i}"),
                    secret_encrypted: None,
                    triggers,
                    created_at: base + Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }

        let matched = store
            .find_by_tenant_and_trigger(tenant, "contact.created")
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);
        assert!(matched[0].url.ends_with("/0"));
        assert!(matched[1].url.ends_with("/1"));

        // Another tenant sees nothing
        let other = store
            .find_by_tenant_and_trigger(TenantId::new(), "contact.created")
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
