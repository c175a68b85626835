//! Credential primitives for the orvia trust core.
//!
//! This crate is the leaf of the dependency graph: password hashing with
//! Argon2id, symmetric encryption of at-rest secrets, TOTP code
//! verification, and generation/hashing of opaque security tokens. It knows
//! nothing about storage or request handling.

pub mod cipher;
pub mod error;
pub mod password;
pub mod token;
pub mod totp;

pub use cipher::SecretCipher;
pub use error::AuthError;
pub use password::{hash_password, verify_password, PasswordHasher};
pub use token::{generate_secure_token, hash_token, verify_token_hash};
pub use totp::{generate_seed, seed_base32, time_step, TotpVerifier, TOTP_DIGITS, TOTP_STEP_SECONDS};
