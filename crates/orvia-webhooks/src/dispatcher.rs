//! Webhook delivery execution.
//!
//! Resolves the tenant's matching destinations for an event, signs the
//! payload per destination secret, and delivers each destination
//! independently: destinations run concurrently under a bounded worker
//! pool, attempts against one destination run strictly sequentially.
//!
//! Exhausting the retry budget drops the event for that destination. There
//! is no dead-letter persistence; the returned [`DeliveryOutcome`] and the
//! `webhook_delivery` log target are the observability surface.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use orvia_auth::SecretCipher;
use orvia_core::WebhookId;
use orvia_store::{Webhook, WebhookStore};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::crypto;
use crate::error::WebhookError;
use crate::event::WebhookEvent;
use crate::SIGNATURE_HEADER;

/// Maximum delivery attempts per destination per event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Timeout for each outbound HTTP call, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default bound on concurrent outbound deliveries.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Dispatcher configuration, resolved once at process start.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Attempts per destination before the event is dropped for it.
    pub max_attempts: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bound on simultaneous outbound connections.
    pub max_concurrent: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// The JSON envelope POSTed to destinations.
#[derive(Debug, Serialize)]
struct DeliveryEnvelope<'a> {
    trigger: &'a str,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    payload: &'a serde_json::Value,
}

/// One HTTP call to a destination for one event.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    /// HTTP status, if a response came back.
    pub status: Option<u16>,
    /// Transport error description, if the call never completed.
    pub error: Option<String>,
    pub latency_ms: u64,
    pub at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Whether this attempt got a 2xx response.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// The per-destination result of dispatching one event.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub webhook_id: WebhookId,
    /// Whether any attempt succeeded.
    pub delivered: bool,
    /// Whether the payload carried a signature header.
    pub signed: bool,
    pub attempts: Vec<DeliveryAttempt>,
}

/// Delivers events to tenant-configured webhook destinations.
#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<dyn WebhookStore>,
    cipher: SecretCipher,
    http_client: reqwest::Client,
    limiter: Arc<Semaphore>,
    max_attempts: u32,
}

impl WebhookDispatcher {
    /// Create a dispatcher with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn WebhookStore>,
        cipher: SecretCipher,
        config: DispatcherConfig,
    ) -> Result<Self, WebhookError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("orvia-webhooks/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            store,
            cipher,
            http_client,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Deliver an event to every matching destination of its tenant.
    ///
    /// Destinations run concurrently (bounded); a failing destination never
    /// delays or affects the others. Returns one outcome per destination.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Vec<DeliveryOutcome> {
        let webhooks = match self
            .store
            .find_by_tenant_and_trigger(event.tenant_id, &event.trigger)
            .await
        {
            Ok(webhooks) => webhooks,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.id,
                    trigger = %event.trigger,
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Failed to resolve matching webhooks"
                );
                return Vec::new();
            }
        };

        if webhooks.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.id,
                trigger = %event.trigger,
                tenant_id = %event.tenant_id,
                "No webhooks subscribe to trigger"
            );
            return Vec::new();
        }

        let envelope = DeliveryEnvelope {
            trigger: &event.trigger,
            created_at: event.created_at,
            payload: &event.payload,
        };
        let body: Arc<[u8]> = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.id,
                    error = %e,
                    "Failed to serialize event envelope"
                );
                return Vec::new();
            }
        };

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.id,
            trigger = %event.trigger,
            tenant_id = %event.tenant_id,
            webhook_count = webhooks.len(),
            "Delivering event to matching webhooks"
        );

        let deliveries = webhooks.into_iter().map(|webhook| {
            let body = Arc::clone(&body);
            let event_id = event.id;
            async move {
                // Bound total outbound connections across destinations.
                let _permit = self.limiter.acquire().await.expect("limiter never closed");
                self.deliver_to_destination(&webhook, event_id, &body).await
            }
        });

        join_all(deliveries).await
    }

    /// Attempt delivery to one destination, sequentially, up to the
    /// configured attempt budget. Stops on the first 2xx.
    async fn deliver_to_destination(
        &self,
        webhook: &Webhook,
        event_id: uuid::Uuid,
        body: &[u8],
    ) -> DeliveryOutcome {
        let signature = self.signature_for(webhook, body);

        let mut attempts = Vec::with_capacity(self.max_attempts as usize);
        let mut delivered = false;

        for attempt_number in 1..=self.max_attempts {
            let attempt = self
                .execute_attempt(webhook, body, signature.as_deref(), attempt_number)
                .await;

            let succeeded = attempt.succeeded();
            self.log_attempt(webhook, event_id, &attempt);
            attempts.push(attempt);

            if succeeded {
                delivered = true;
                break;
            }
        }

        if !delivered {
            tracing::warn!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                event_id = %event_id,
                attempts = attempts.len(),
                "Retry budget exhausted, dropping event for destination"
            );
        }

        DeliveryOutcome {
            webhook_id: webhook.id,
            delivered,
            signed: signature.is_some(),
            attempts,
        }
    }

    /// Compute the signature header value, if the destination has a usable
    /// secret. A secret that fails to decrypt downgrades to unsigned
    /// delivery with a warning; a signature is never fabricated.
    fn signature_for(&self, webhook: &Webhook, body: &[u8]) -> Option<String> {
        let secret_encrypted = webhook.secret_encrypted.as_ref()?;
        match self.cipher.decrypt_string(secret_encrypted) {
            Ok(secret) => Some(format!(
                "sha256={}",
                crypto::compute_signature(&secret, body)
            )),
            Err(e) => {
                tracing::warn!(
                    target: "webhook_delivery",
                    webhook_id = %webhook.id,
                    error = %e,
                    "Failed to decrypt webhook secret, delivering unsigned"
                );
                None
            }
        }
    }

    /// One fresh HTTP POST to the destination.
    async fn execute_attempt(
        &self,
        webhook: &Webhook,
        body: &[u8],
        signature: Option<&str>,
        attempt_number: u32,
    ) -> DeliveryAttempt {
        let mut request = self
            .http_client
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .body(body.to_vec());

        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let start = Instant::now();
        let result = request.send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => DeliveryAttempt {
                attempt: attempt_number,
                status: Some(response.status().as_u16()),
                error: None,
                latency_ms,
                at: Utc::now(),
            },
            Err(e) => {
                let error = if e.is_timeout() {
                    "request timeout".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                DeliveryAttempt {
                    attempt: attempt_number,
                    status: None,
                    error: Some(error),
                    latency_ms,
                    at: Utc::now(),
                }
            }
        }
    }

    fn log_attempt(&self, webhook: &Webhook, event_id: uuid::Uuid, attempt: &DeliveryAttempt) {
        if attempt.succeeded() {
            tracing::info!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                event_id = %event_id,
                attempt = attempt.attempt,
                status = attempt.status,
                latency_ms = attempt.latency_ms,
                "Webhook delivery succeeded"
            );
        } else {
            tracing::warn!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                event_id = %event_id,
                attempt = attempt.attempt,
                status = attempt.status,
                error = attempt.error.as_deref().unwrap_or("non-2xx response"),
                latency_ms = attempt.latency_ms,
                "Webhook delivery attempt failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_success_requires_2xx() {
        let attempt = |status: Option<u16>| DeliveryAttempt {
            attempt: 1,
            status,
            error: None,
            latency_ms: 5,
            at: Utc::now(),
        };

        assert!(attempt(Some(200)).succeeded());
        assert!(attempt(Some(204)).succeeded());
        assert!(!attempt(Some(301)).succeeded());
        assert!(!attempt(Some(500)).succeeded());
        assert!(!attempt(None).succeeded());
    }

    #[test]
    fn test_envelope_serialization_shape() {
        let payload = serde_json::json!({"contact_id": "c-42"});
        let envelope = DeliveryEnvelope {
            trigger: "contact.created",
            created_at: Utc::now(),
            payload: &payload,
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["trigger"], "contact.created");
        assert!(value["createdAt"].is_string());
        assert_eq!(value["payload"]["contact_id"], "c-42");
    }

    #[test]
    fn test_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.timeout_secs, 10);
    }
}
