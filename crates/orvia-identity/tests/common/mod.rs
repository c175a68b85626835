//! Shared fixtures for identity integration tests.
//!
//! Builds the full service graph over one in-memory store, with cheap
//! Argon2 parameters so the suite stays fast.

#![allow(dead_code)]

use std::sync::Arc;

use orvia_auth::{PasswordHasher, SecretCipher};
use orvia_core::TenantId;
use orvia_identity::{
    AccountService, ApiKeyService, CredentialVerifier, SecondFactorService, SessionConfig,
    SessionManager, SignInFlow,
};
use orvia_store::MemoryStore;

pub const ISSUER: &str = "Orvia Test";
pub const MASTER_KEY: &str = "test-master-key";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub cipher: SecretCipher,
    pub tenant: TenantId,
    pub flow: SignInFlow,
    pub sessions: SessionManager,
    pub accounts: AccountService,
    pub second_factor: SecondFactorService,
    pub api_keys: ApiKeyService,
}

impl Harness {
    /// Full service graph over the revocable session strategy.
    pub fn new() -> Self {
        Self::with_session_config(SessionConfig::revocable())
    }

    pub fn with_session_config(session_config: SessionConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cipher = SecretCipher::new(MASTER_KEY);

        let hasher = PasswordHasher::with_params(4096, 1, 1).unwrap();
        let credentials = CredentialVerifier::new(store.clone()).with_hasher(hasher);
        let sessions = SessionManager::new(store.clone(), session_config);
        let flow = SignInFlow::new(
            credentials.clone(),
            store.clone(),
            store.clone(),
            sessions.clone(),
            cipher.clone(),
            ISSUER,
        );
        let accounts = AccountService::new(
            store.clone(),
            store.clone(),
            credentials,
            sessions.clone(),
        );
        let second_factor = SecondFactorService::new(store.clone(), cipher.clone(), ISSUER);
        let api_keys = ApiKeyService::new(store.clone());

        Self {
            store,
            cipher,
            tenant: TenantId::new(),
            flow,
            sessions,
            accounts,
            second_factor,
            api_keys,
        }
    }
}

/// Build a TOTP generator from the Base32 secret handed out at enrollment.
pub fn totp_from_base32(secret_base32: &str) -> totp_rs::TOTP {
    let seed = data_encoding::BASE32_NOPAD
        .decode(secret_base32.as_bytes())
        .expect("enrollment secret is valid Base32");
    totp_rs::TOTP::new(totp_rs::Algorithm::SHA1, 6, 1, 30, seed, None, String::new())
        .expect("enrollment seed builds a TOTP instance")
}

/// The currently valid code for an enrollment secret.
pub fn valid_code(secret_base32: &str) -> String {
    totp_from_base32(secret_base32)
        .generate_current()
        .expect("system time is sane")
}

/// A six-digit code guaranteed invalid for the secret right now, including
/// the ±1 step tolerance window.
pub fn wrong_code(secret_base32: &str) -> String {
    let totp = totp_from_base32(secret_base32);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let nearby: Vec<String> = [now - 30, now, now + 30]
        .iter()
        .map(|t| totp.generate(*t))
        .collect();

    for candidate in ["000000", "111111", "222222", "333333"] {
        if !nearby.iter().any(|c| c == candidate) {
            return candidate.to_string();
        }
    }
    unreachable!("four candidates cannot all collide with three codes")
}
