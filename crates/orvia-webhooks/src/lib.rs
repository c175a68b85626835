//! Webhook delivery for tenant-subscribed business events.
//!
//! Business logic publishes a [`WebhookEvent`] through the
//! [`EventPublisher`] and returns immediately; the [`DeliveryWorker`]
//! consumes the channel and hands each event to the [`WebhookDispatcher`],
//! which signs payloads per destination secret and delivers them with
//! bounded retries, independently per destination.

pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod worker;

pub use dispatcher::{DeliveryAttempt, DeliveryOutcome, DispatcherConfig, WebhookDispatcher};
pub use error::WebhookError;
pub use event::{EventPublisher, WebhookEvent};
pub use worker::DeliveryWorker;

/// Header carrying the hex-encoded HMAC-SHA256 signature of the body.
pub const SIGNATURE_HEADER: &str = "X-Orvia-Signature";
