//! Persistence collaborator for the orvia trust core.
//!
//! The trust core does not prescribe a storage engine. This crate defines
//! the data models and async repository traits the identity and webhook
//! crates program against, plus [`MemoryStore`], an in-process
//! implementation backing the test suite and embedded deployments.
//!
//! Uniqueness guarantees (token hashes, API key hashes, one email per
//! tenant) are the store's responsibility, not the caller's.

pub mod error;
pub mod memory;
pub mod models;
pub mod repo;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{
    ApiKeyRecord, ChallengeMethod, ChallengeRecord, Principal, SecondFactor, SessionRecord,
    Webhook,
};
pub use repo::{
    ApiKeyStore, ChallengeStore, PrincipalStore, SecondFactorStore, SessionStore, WebhookStore,
};
