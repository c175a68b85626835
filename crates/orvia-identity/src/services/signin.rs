//! The sign-in state machine.
//!
//! `AwaitingPrimary → AwaitingSecondFactor → Authenticated`, with failure
//! reachable from every state. [`begin`] covers the primary step: it either
//! mints a session directly (no second factor enrolled) or mints a
//! short-lived, single-use challenge token. [`complete_totp`] and
//! [`complete_recovery`] cover the step-up: they verify the submitted proof
//! against the challenge's principal and, on success, atomically consume
//! the challenge before minting the session — under concurrent submission
//! of the same challenge, exactly one caller wins.
//!
//! [`begin`]: SignInFlow::begin
//! [`complete_totp`]: SignInFlow::complete_totp
//! [`complete_recovery`]: SignInFlow::complete_recovery

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use orvia_auth::{generate_secure_token, hash_token, time_step, SecretCipher, TotpVerifier};
use orvia_core::{ChallengeId, TenantId};
use orvia_store::{
    ChallengeMethod, ChallengeRecord, ChallengeStore, Principal, SecondFactor, SecondFactorStore,
};
use orvia_webhooks::{EventPublisher, WebhookEvent};

use crate::error::IdentityError;
use crate::services::credentials::{normalize_email, CredentialVerifier};
use crate::services::second_factor::{hash_recovery_code, normalize_recovery_code};
use crate::services::sessions::{IssuedSession, SessionManager};

/// Challenge token lifetime in minutes.
pub const CHALLENGE_TTL_MINUTES: i64 = 5;

/// Failed second-factor submissions before lockout.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Lockout duration after too many failed submissions, in minutes.
pub const LOCKOUT_MINUTES: i64 = 5;

/// Webhook trigger published on a successful sign-in.
const SIGNED_IN_TRIGGER: &str = "principal.signed_in";

/// Webhook trigger published on a failed primary-factor attempt.
const SIGN_IN_FAILED_TRIGGER: &str = "principal.sign_in_failed";

/// The challenge handed back when a second factor is required.
///
/// This is the expected transition signal of the state machine, not a
/// failure.
#[derive(Debug)]
pub struct ChallengeIssued {
    /// Opaque single-use token bridging to the second-factor step.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Acceptable next actions.
    pub methods: Vec<ChallengeMethod>,
}

/// Result of a successful primary-factor submission.
#[derive(Debug)]
pub enum SignInOutcome {
    /// No second factor enrolled; authenticated outright.
    Session(IssuedSession),
    /// Second factor required; continue with the challenge token.
    ChallengeRequired(ChallengeIssued),
}

/// Orchestrates the multi-step login protocol.
#[derive(Clone)]
pub struct SignInFlow {
    credentials: CredentialVerifier,
    factors: Arc<dyn SecondFactorStore>,
    challenges: Arc<dyn ChallengeStore>,
    sessions: SessionManager,
    cipher: SecretCipher,
    totp: TotpVerifier,
    publisher: Option<EventPublisher>,
}

impl SignInFlow {
    #[must_use]
    pub fn new(
        credentials: CredentialVerifier,
        factors: Arc<dyn SecondFactorStore>,
        challenges: Arc<dyn ChallengeStore>,
        sessions: SessionManager,
        cipher: SecretCipher,
        issuer: &str,
    ) -> Self {
        Self {
            credentials,
            factors,
            challenges,
            sessions,
            cipher,
            totp: TotpVerifier::new(issuer),
            publisher: None,
        }
    }

    /// Publish sign-in lifecycle events to tenant webhooks.
    #[must_use]
    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Submit the primary factor.
    ///
    /// # Errors
    ///
    /// `IdentityError::IncorrectCredentials` for unknown email or wrong
    /// password, identically.
    pub async fn begin(
        &self,
        tenant_id: TenantId,
        email: &str,
        password: &str,
    ) -> Result<SignInOutcome, IdentityError> {
        let principal = match self.credentials.verify_primary(tenant_id, email, password).await {
            Ok(principal) => principal,
            Err(err) => {
                if matches!(err, IdentityError::IncorrectCredentials) {
                    self.publish(
                        tenant_id,
                        SIGN_IN_FAILED_TRIGGER,
                        serde_json::json!({ "email": normalize_email(email) }),
                    );
                }
                return Err(err);
            }
        };

        let factor = self.factors.find_factor(principal.id).await?;
        let second_factor_enrolled = factor.is_some_and(|f| f.enabled);

        if second_factor_enrolled {
            let challenge = self.mint_challenge(&principal).await?;
            tracing::info!(
                user_id = %principal.id,
                tenant_id = %tenant_id,
                "Primary factor verified, second factor required"
            );
            return Ok(SignInOutcome::ChallengeRequired(challenge));
        }

        let session = self.authenticated(&principal).await?;
        Ok(SignInOutcome::Session(session))
    }

    /// Submit a TOTP code against a challenge token.
    ///
    /// A wrong code leaves the challenge usable until its own expiry; a
    /// consumed or expired challenge forces a restart from the password
    /// step.
    pub async fn complete_totp(
        &self,
        challenge_token: &str,
        code: &str,
    ) -> Result<IssuedSession, IdentityError> {
        let challenge = self.load_usable_challenge(challenge_token).await?;
        self.require_method(&challenge, ChallengeMethod::Totp)?;

        let factor = self
            .factors
            .find_factor(challenge.user_id)
            .await?
            .filter(|f| f.enabled)
            // Factor removed mid-flight; the challenge is moot
            .ok_or(IdentityError::RequestExpired)?;

        let now = Utc::now();
        if factor.is_locked(now) {
            return Err(IdentityError::RateLimitExceeded);
        }

        // Reject replay of a code from an already-used time step.
        if let Some(last_used_step) = factor.last_used_step {
            if time_step(now.timestamp()) <= last_used_step + 1 {
                tracing::warn!(
                    user_id = %challenge.user_id,
                    "TOTP code replay within used time window rejected"
                );
                return Err(IdentityError::IncorrectSecondFactorCode);
            }
        }

        let seed = self.cipher.decrypt(&factor.seed_encrypted)?;
        if !self.totp.check(&seed, code)? {
            return Err(self.record_failed_attempt(&factor, now).await?);
        }

        // Consume before any side effect of success; the losing side of a
        // concurrent double submission stops here.
        self.consume_challenge(&challenge, now).await?;

        self.factors
            .record_factor_success(challenge.user_id, Some(time_step(now.timestamp())))
            .await?;

        self.finish_challenge(&challenge).await
    }

    /// Submit a recovery code against a challenge token.
    ///
    /// The matching stored code is invalidated on use.
    pub async fn complete_recovery(
        &self,
        challenge_token: &str,
        code: &str,
    ) -> Result<IssuedSession, IdentityError> {
        let challenge = self.load_usable_challenge(challenge_token).await?;
        self.require_method(&challenge, ChallengeMethod::Recovery)?;

        let code_hash = hash_recovery_code(&normalize_recovery_code(code));
        let consumed = self
            .factors
            .consume_recovery_code(challenge.user_id, &code_hash)
            .await?;
        if !consumed {
            tracing::debug!(
                user_id = %challenge.user_id,
                "Recovery code did not match an unused code"
            );
            return Err(IdentityError::IncorrectRecoveryCode);
        }

        self.consume_challenge(&challenge, Utc::now()).await?;

        // A valid recovery code also clears any TOTP lockout.
        self.factors
            .record_factor_success(challenge.user_id, None)
            .await?;

        self.finish_challenge(&challenge).await
    }

    /// Mint the single-use challenge for the second-factor step.
    async fn mint_challenge(
        &self,
        principal: &Principal,
    ) -> Result<ChallengeIssued, IdentityError> {
        let token = generate_secure_token();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(CHALLENGE_TTL_MINUTES);
        let methods = vec![ChallengeMethod::Totp, ChallengeMethod::Recovery];

        self.challenges
            .insert_challenge(ChallengeRecord {
                id: ChallengeId::new(),
                user_id: principal.id,
                tenant_id: principal.tenant_id,
                token_hash: hash_token(&token),
                methods: methods.clone(),
                created_at: now,
                expires_at,
                consumed_at: None,
            })
            .await?;

        Ok(ChallengeIssued {
            token,
            expires_at,
            methods,
        })
    }

    /// Resolve a presented challenge token to a usable record.
    ///
    /// Unknown, consumed and expired all collapse to `RequestExpired`.
    async fn load_usable_challenge(
        &self,
        challenge_token: &str,
    ) -> Result<ChallengeRecord, IdentityError> {
        let challenge = self
            .challenges
            .find_challenge_by_token_hash(&hash_token(challenge_token))
            .await?
            .ok_or(IdentityError::RequestExpired)?;

        if !challenge.is_usable(Utc::now()) {
            tracing::debug!(
                challenge_id = %challenge.id,
                "Consumed or expired challenge presented"
            );
            return Err(IdentityError::RequestExpired);
        }

        Ok(challenge)
    }

    fn require_method(
        &self,
        challenge: &ChallengeRecord,
        method: ChallengeMethod,
    ) -> Result<(), IdentityError> {
        if challenge.methods.contains(&method) {
            Ok(())
        } else {
            Err(IdentityError::Validation(
                "challenge does not accept this method".to_string(),
            ))
        }
    }

    /// Atomically consume the challenge; losing a race or racing expiry is
    /// a `RequestExpired`.
    async fn consume_challenge(
        &self,
        challenge: &ChallengeRecord,
        now: DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        if self.challenges.consume_challenge(challenge.id, now).await? {
            Ok(())
        } else {
            tracing::warn!(
                challenge_id = %challenge.id,
                "Challenge consumption lost to a concurrent submission or expiry"
            );
            Err(IdentityError::RequestExpired)
        }
    }

    /// Record a failed code submission and translate it into the caller's
    /// error.
    async fn record_failed_attempt(
        &self,
        factor: &SecondFactor,
        now: DateTime<Utc>,
    ) -> Result<IdentityError, IdentityError> {
        let attempts = self
            .factors
            .record_factor_failure(
                factor.user_id,
                MAX_FAILED_ATTEMPTS,
                now + Duration::minutes(LOCKOUT_MINUTES),
            )
            .await?;

        if attempts >= MAX_FAILED_ATTEMPTS {
            tracing::warn!(
                user_id = %factor.user_id,
                attempts,
                "Second factor locked after repeated failures"
            );
            Ok(IdentityError::RateLimitExceeded)
        } else {
            Ok(IdentityError::IncorrectSecondFactorCode)
        }
    }

    /// Mint the session completing a second-factor challenge.
    async fn finish_challenge(
        &self,
        challenge: &ChallengeRecord,
    ) -> Result<IssuedSession, IdentityError> {
        let session = self
            .sessions
            .mint(challenge.user_id, challenge.tenant_id)
            .await?;

        tracing::info!(
            user_id = %challenge.user_id,
            session_id = %session.session_id,
            "Second factor verified, session minted"
        );

        self.publish(
            challenge.tenant_id,
            SIGNED_IN_TRIGGER,
            serde_json::json!({ "user_id": challenge.user_id }),
        );

        Ok(session)
    }

    /// Mint the session for a principal with no second factor.
    async fn authenticated(&self, principal: &Principal) -> Result<IssuedSession, IdentityError> {
        let session = self.sessions.mint(principal.id, principal.tenant_id).await?;

        tracing::info!(
            user_id = %principal.id,
            session_id = %session.session_id,
            "Primary factor verified, session minted"
        );

        self.publish(
            principal.tenant_id,
            SIGNED_IN_TRIGGER,
            serde_json::json!({ "user_id": principal.id }),
        );

        Ok(session)
    }

    fn publish(&self, tenant_id: TenantId, trigger: &str, payload: serde_json::Value) {
        if let Some(ref publisher) = self.publisher {
            publisher.publish(WebhookEvent::new(tenant_id, trigger, payload));
        }
    }
}
