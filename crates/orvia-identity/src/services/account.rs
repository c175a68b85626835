//! Principal lifecycle: registration, password change, deletion.
//!
//! Owns the security invariant that changing a password or deleting the
//! account invalidates every active session of the principal.

use std::sync::Arc;

use chrono::Utc;
use orvia_core::{TenantId, UserId};
use orvia_store::{Principal, PrincipalStore, SecondFactorStore};

use crate::error::IdentityError;
use crate::services::credentials::{normalize_email, CredentialVerifier};
use crate::services::sessions::SessionManager;

/// Minimum accepted password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration, password and deletion operations.
#[derive(Clone)]
pub struct AccountService {
    principals: Arc<dyn PrincipalStore>,
    factors: Arc<dyn SecondFactorStore>,
    credentials: CredentialVerifier,
    sessions: SessionManager,
}

impl AccountService {
    #[must_use]
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        factors: Arc<dyn SecondFactorStore>,
        credentials: CredentialVerifier,
        sessions: SessionManager,
    ) -> Self {
        Self {
            principals,
            factors,
            credentials,
            sessions,
        }
    }

    /// Register a new principal.
    ///
    /// # Errors
    ///
    /// - `IdentityError::Validation` for a malformed email or short password
    /// - `IdentityError::Store` with `Conflict` if the email is taken
    pub async fn register(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
    ) -> Result<Principal, IdentityError> {
        let normalized = normalize_email(email);
        validate_email(&normalized)?;
        validate_password(password)?;

        let password_hash = self
            .credentials
            .hasher()
            .hash(password)
            .map_err(|e| IdentityError::Internal(format!("Password hashing failed: {e}")))?;

        let principal = Principal {
            id: UserId::new(),
            tenant_id,
            email: normalized,
            password_hash: Some(password_hash),
            created_at: Utc::now(),
        };

        self.principals.create_principal(principal.clone()).await?;

        tracing::info!(
            user_id = %principal.id,
            tenant_id = %tenant_id,
            "Principal registered"
        );

        Ok(principal)
    }

    /// Set a new password and invalidate every active session.
    ///
    /// Used for both user-initiated change and reset flows; in either case
    /// all other sessions must stop working immediately.
    pub async fn change_password(
        &self,
        user_id: UserId,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        validate_password(new_password)?;

        let password_hash = self
            .credentials
            .hasher()
            .hash(new_password)
            .map_err(|e| IdentityError::Internal(format!("Password hashing failed: {e}")))?;

        self.principals
            .set_password_hash(user_id, Some(password_hash))
            .await?;

        let revoked = self.sessions.revoke_all(user_id).await?;
        tracing::info!(
            user_id = %user_id,
            revoked_sessions = revoked,
            "Password changed, sessions invalidated"
        );

        Ok(())
    }

    /// Delete the principal, cascading second-factor and session cleanup.
    pub async fn delete_account(&self, user_id: UserId) -> Result<bool, IdentityError> {
        let existed = self.principals.delete_principal(user_id).await?;
        if !existed {
            return Ok(false);
        }

        self.factors.delete_factor(user_id).await?;
        let revoked = self.sessions.revoke_all(user_id).await?;

        tracing::info!(
            user_id = %user_id,
            revoked_sessions = revoked,
            "Account deleted"
        );

        Ok(true)
    }
}

fn validate_email(normalized: &str) -> Result<(), IdentityError> {
    let valid = normalized
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(IdentityError::Validation("invalid email address".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), IdentityError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(IdentityError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@nodot").is_err());
    }

    #[test]
    fn test_password_validation() {
        assert!(validate_password("P@ssw0rd!").is_ok());
        assert!(validate_password("short").is_err());
    }
}
