//! Session issuance, validation and revocation.
//!
//! Two strategies behind one contract. The stateless strategy embeds the
//! claims in a signed token and validates without touching the store; the
//! revocable strategy stores an opaque token server-side and supports
//! immediate revocation. `validate` treats an expired session identically
//! to an unknown one in both strategies.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use orvia_auth::{generate_secure_token, hash_token};
use orvia_core::{SessionId, TenantId, UserId};
use orvia_store::{SessionRecord, SessionStore};
use serde::{Deserialize, Serialize};

use crate::config::{SessionConfig, SessionStrategy};
use crate::error::IdentityError;

/// Clock-skew leeway for stateless token validation, in seconds.
const STATELESS_LEEWAY_SECS: u64 = 60;

/// Claims embedded in a stateless session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Principal ID.
    sub: String,
    /// Tenant ID.
    tid: String,
    /// Session ID.
    jti: String,
    iat: i64,
    exp: i64,
}

/// The authenticated identity a validated session proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
}

/// A freshly minted session.
///
/// The token is returned to the caller exactly once; the revocable
/// strategy stores only its hash.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: SessionId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// One entry in a principal's active-session listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether this record matches the token the caller presented.
    /// Derived server-side by hash comparison, never client-supplied.
    pub is_current: bool,
}

/// Mints, validates and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Mint a session for a principal.
    ///
    /// # Errors
    ///
    /// `IdentityError::Internal` if token encoding fails, or a store error
    /// under the revocable strategy.
    pub async fn mint(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> Result<IssuedSession, IdentityError> {
        let session_id = SessionId::new();
        let now = Utc::now();
        let expires_at = now + self.config.ttl;

        let token = match &self.config.strategy {
            SessionStrategy::Stateless { signing_key } => {
                let claims = SessionClaims {
                    sub: user_id.to_string(),
                    tid: tenant_id.to_string(),
                    jti: session_id.to_string(),
                    iat: now.timestamp(),
                    exp: expires_at.timestamp(),
                };
                encode(
                    &Header::new(Algorithm::HS256),
                    &claims,
                    &EncodingKey::from_secret(signing_key),
                )
                .map_err(|e| IdentityError::Internal(format!("Token encoding failed: {e}")))?
            }
            SessionStrategy::Revocable => {
                let token = generate_secure_token();
                self.store
                    .insert_session(SessionRecord {
                        id: session_id,
                        user_id,
                        tenant_id,
                        token_hash: hash_token(&token),
                        created_at: now,
                        expires_at,
                        last_seen_at: now,
                    })
                    .await?;
                token
            }
        };

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            strategy = self.config.strategy.name(),
            "Session minted"
        );

        Ok(IssuedSession {
            session_id,
            token,
            expires_at,
        })
    }

    /// Validate a presented token.
    ///
    /// # Errors
    ///
    /// `IdentityError::AuthFailure` for any invalid token — expired,
    /// unknown, tampered or revoked are indistinguishable to the caller.
    pub async fn validate(&self, token: &str) -> Result<AuthContext, IdentityError> {
        match &self.config.strategy {
            SessionStrategy::Stateless { signing_key } => {
                self.validate_stateless(token, signing_key)
            }
            SessionStrategy::Revocable => self.validate_revocable(token).await,
        }
    }

    fn validate_stateless(
        &self,
        token: &str,
        signing_key: &[u8],
    ) -> Result<AuthContext, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = STATELESS_LEEWAY_SECS;

        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(signing_key),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "Stateless session token rejected");
            IdentityError::AuthFailure
        })?;

        let claims = data.claims;
        let user_id: UserId = claims.sub.parse().map_err(|_| IdentityError::AuthFailure)?;
        let tenant_id: TenantId = claims.tid.parse().map_err(|_| IdentityError::AuthFailure)?;
        let session_id: SessionId = claims.jti.parse().map_err(|_| IdentityError::AuthFailure)?;

        Ok(AuthContext {
            user_id,
            tenant_id,
            session_id,
        })
    }

    async fn validate_revocable(&self, token: &str) -> Result<AuthContext, IdentityError> {
        let token_hash = hash_token(token);

        let session = self
            .store
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(IdentityError::AuthFailure)?;

        let now = Utc::now();
        if !session.is_active(now) {
            // Same outcome as not-found; the distinction stays in logs.
            tracing::debug!(session_id = %session.id, "Expired session presented");
            return Err(IdentityError::AuthFailure);
        }

        if self.config.sliding {
            self.store
                .touch_session(session.id, now + self.config.ttl)
                .await?;
        }

        Ok(AuthContext {
            user_id: session.user_id,
            tenant_id: session.tenant_id,
            session_id: session.id,
        })
    }

    /// Revoke one session.
    ///
    /// # Errors
    ///
    /// `IdentityError::Unsupported` under the stateless strategy, which has
    /// no revocation mechanism beyond expiry.
    pub async fn revoke(&self, session_id: SessionId) -> Result<bool, IdentityError> {
        self.require_revocable("revoke")?;
        let removed = self.store.delete_session(session_id).await?;
        if removed {
            tracing::info!(session_id = %session_id, "Session revoked");
        }
        Ok(removed)
    }

    /// Revoke every session of a principal.
    ///
    /// Invoked on password reset and account deletion: both must invalidate
    /// every other active session.
    ///
    /// # Errors
    ///
    /// `IdentityError::Unsupported` under the stateless strategy.
    pub async fn revoke_all(&self, user_id: UserId) -> Result<u64, IdentityError> {
        self.require_revocable("revoke_all")?;
        let removed = self.store.delete_all_for_principal(user_id).await?;
        tracing::info!(user_id = %user_id, revoked = removed, "All sessions revoked");
        Ok(removed)
    }

    /// Revoke every session of a principal except the current one
    /// ("sign out other devices").
    ///
    /// # Errors
    ///
    /// `IdentityError::Unsupported` under the stateless strategy.
    pub async fn revoke_all_except(
        &self,
        user_id: UserId,
        keep: SessionId,
    ) -> Result<u64, IdentityError> {
        self.require_revocable("revoke_all_except")?;
        let removed = self.store.delete_all_except(user_id, keep).await?;
        tracing::info!(
            user_id = %user_id,
            revoked = removed,
            "Other sessions revoked"
        );
        Ok(removed)
    }

    /// List a principal's active sessions, marking the one matching the
    /// presented token as current.
    ///
    /// # Errors
    ///
    /// `IdentityError::Unsupported` under the stateless strategy.
    pub async fn list(
        &self,
        user_id: UserId,
        presented_token: Option<&str>,
    ) -> Result<Vec<SessionView>, IdentityError> {
        self.require_revocable("list")?;

        let presented_hash = presented_token.map(hash_token);
        let sessions = self.store.list_active_for_principal(user_id).await?;

        Ok(sessions
            .into_iter()
            .map(|s| {
                let is_current = presented_hash
                    .as_deref()
                    .is_some_and(|hash| hash == s.token_hash);
                SessionView {
                    id: s.id,
                    created_at: s.created_at,
                    last_seen_at: s.last_seen_at,
                    expires_at: s.expires_at,
                    is_current,
                }
            })
            .collect())
    }

    fn require_revocable(&self, operation: &'static str) -> Result<(), IdentityError> {
        match self.config.strategy {
            SessionStrategy::Revocable => Ok(()),
            SessionStrategy::Stateless { .. } => {
                tracing::warn!(
                    operation,
                    "Stateless sessions cannot be revoked server-side; rely on short expiry"
                );
                Err(IdentityError::Unsupported("stateless"))
            }
        }
    }
}
