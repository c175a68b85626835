//! Error types for the webhook delivery system.
//!
//! Delivery failures against a destination are *outcomes*, not errors: they
//! are recorded in [`DeliveryOutcome`](crate::dispatcher::DeliveryOutcome)
//! and logged, and never propagate to the business transaction that raised
//! the event.

use orvia_store::StoreError;
use thiserror::Error;

/// Webhook system error variants.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
