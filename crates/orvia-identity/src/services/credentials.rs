//! Primary-factor (password) verification.

use std::sync::Arc;

use orvia_auth::PasswordHasher;
use orvia_core::TenantId;
use orvia_store::{Principal, PrincipalStore};

use crate::error::IdentityError;

/// Normalize an email for lookup: trim surrounding whitespace and
/// case-fold. Emails are unique per tenant in this form.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Verifies a principal's password against the stored hash.
#[derive(Clone)]
pub struct CredentialVerifier {
    principals: Arc<dyn PrincipalStore>,
    hasher: PasswordHasher,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(principals: Arc<dyn PrincipalStore>) -> Self {
        Self {
            principals,
            hasher: PasswordHasher::default(),
        }
    }

    /// Override the password hasher (tests use cheaper parameters).
    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub(crate) fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Verify email + password for a tenant.
    ///
    /// Unknown email, a principal without a local password (federated
    /// identity only), and a wrong password all produce the same
    /// `IncorrectCredentials` — the distinction survives only in logs.
    ///
    /// # Errors
    ///
    /// - `IdentityError::IncorrectCredentials` on any credential mismatch
    /// - `IdentityError::Store` if the lookup fails
    pub async fn verify_primary(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
    ) -> Result<Principal, IdentityError> {
        let normalized = normalize_email(email);

        let principal = self
            .principals
            .find_by_email(tenant_id, &normalized)
            .await?;

        let Some(principal) = principal else {
            tracing::debug!(tenant_id = %tenant_id, "Sign-in attempt for unknown email");
            return Err(IdentityError::IncorrectCredentials);
        };

        let Some(ref password_hash) = principal.password_hash else {
            tracing::debug!(
                user_id = %principal.id,
                "Sign-in attempt for principal without a local password"
            );
            return Err(IdentityError::IncorrectCredentials);
        };

        let valid = self
            .hasher
            .verify(password, password_hash)
            .map_err(|e| IdentityError::Internal(format!("Password verification failed: {e}")))?;

        if !valid {
            tracing::debug!(user_id = %principal.id, "Invalid password attempt");
            return Err(IdentityError::IncorrectCredentials);
        }

        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("TEST@EXAMPLE.COM"), "test@example.com");
        assert_eq!(normalize_email("  Alice@Example.com  "), "alice@example.com");
    }
}
