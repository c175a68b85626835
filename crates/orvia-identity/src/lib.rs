//! Identity services for the orvia trust core.
//!
//! Covers the full human and machine authentication surface:
//!
//! - [`CredentialVerifier`] — primary-factor (password) verification
//! - [`SignInFlow`] — the sign-in state machine, including the second-factor
//!   challenge step
//! - [`SessionManager`] — session issuance and validation under the
//!   stateless or revocable strategy
//! - [`ApiKeyService`] — machine credentials for tenant API access
//! - [`SecondFactorService`] — TOTP enrollment and recovery codes
//! - [`AccountService`] — registration, password change, account deletion
//!
//! Every component takes its collaborators through its constructor; nothing
//! is resolved from ambient state.

pub mod config;
pub mod error;
pub mod services;

pub use config::{SessionConfig, SessionStrategy};
pub use error::IdentityError;
pub use services::account::AccountService;
pub use services::api_keys::{ApiKeyIdentity, ApiKeyService, API_KEY_LENGTH, API_KEY_PREFIX};
pub use services::credentials::{normalize_email, CredentialVerifier};
pub use services::second_factor::{
    EnrollmentStart, SecondFactorService, SecondFactorStatus, RECOVERY_CODE_COUNT,
};
pub use services::sessions::{AuthContext, IssuedSession, SessionManager, SessionView};
pub use services::signin::{ChallengeIssued, SignInFlow, SignInOutcome, CHALLENGE_TTL_MINUTES};
