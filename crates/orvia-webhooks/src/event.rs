//! Event publishing over a broadcast channel.
//!
//! Publishing is fire-and-forget: the transaction that raised the event
//! never blocks on, or fails because of, webhook delivery.

use chrono::{DateTime, Utc};
use orvia_core::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A business event eligible for webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Trigger kind, e.g. `contact.created`.
    pub trigger: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl WebhookEvent {
    /// Build an event for the given tenant and trigger, stamped now.
    #[must_use]
    pub fn new(tenant_id: TenantId, trigger: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            trigger: trigger.into(),
            created_at: Utc::now(),
            payload,
        }
    }
}

/// Publisher that sends events to all delivery workers.
#[derive(Clone)]
pub struct EventPublisher {
    sender: tokio::sync::broadcast::Sender<WebhookEvent>,
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity, returning the
    /// initial receiver for a worker.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<WebhookEvent>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event. Fire-and-forget; a missing subscriber is logged,
    /// never propagated.
    pub fn publish(&self, event: WebhookEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                target: "webhook_delivery",
                error = %e,
                "No active webhook workers to receive event"
            );
        }
    }

    /// Get an additional receiver for another worker.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }
}
