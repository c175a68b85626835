//! Core types shared by the orvia trust and access crates.
//!
//! Provides strongly typed identifiers used across the identity, store and
//! webhook crates. Using distinct newtypes prevents a `UserId` from being
//! passed where a `TenantId` is expected.

pub mod ids;

pub use ids::{ApiKeyId, ChallengeId, ParseIdError, SessionId, TenantId, UserId, WebhookId};
