//! Common test utilities for webhook delivery integration tests.
//!
//! Provides capturing and failing wiremock responders plus fixture helpers
//! for building a dispatcher against the in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use orvia_auth::SecretCipher;
use orvia_core::{TenantId, WebhookId};
use orvia_store::{MemoryStore, Webhook, WebhookStore};
use orvia_webhooks::{DispatcherConfig, WebhookDispatcher};
use wiremock::{Request, Respond, ResponseTemplate};

/// Master key used by every test cipher.
pub const MASTER_KEY: &str = "test-master-key";

/// Signing secret configured on signed destinations.
pub const SECRET: &str = "whsec_test_secret_key_12345";

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("captured body is JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

/// A responder that captures incoming requests and returns a fixed status.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    pub fn ok() -> Self {
        Self::with_status(200)
    }

    pub fn with_status(response_code: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code,
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let headers = request
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        self.requests.lock().unwrap().push(CapturedRequest {
            body: request.body.clone(),
            headers,
        });

        ResponseTemplate::new(self.response_code)
    }
}

/// A responder that returns 500 for the first `fail_count` requests, then
/// 200 for the rest.
#[derive(Clone)]
pub struct FailingResponder {
    fail_count: u32,
    attempts: Arc<AtomicU32>,
}

impl FailingResponder {
    pub fn fail_times(fail_count: u32) -> Self {
        Self {
            fail_count,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_count {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200)
        }
    }
}

/// Insert a webhook subscribed to `triggers`, optionally with the standard
/// signing secret.
pub async fn insert_webhook(
    store: &MemoryStore,
    cipher: &SecretCipher,
    tenant_id: TenantId,
    url: &str,
    triggers: &[&str],
    signed: bool,
) -> WebhookId {
    let webhook = Webhook {
        id: WebhookId::new(),
        tenant_id,
        url: url.to_string(),
        secret_encrypted: signed.then(|| cipher.encrypt(SECRET.as_bytes())),
        triggers: triggers.iter().map(|t| (*t).to_string()).collect(),
        created_at: Utc::now(),
    };
    let id = webhook.id;
    store.insert_webhook(webhook).await.unwrap();
    id
}

/// Build a dispatcher over the given store with default config.
pub fn dispatcher(store: Arc<MemoryStore>) -> WebhookDispatcher {
    WebhookDispatcher::new(
        store,
        SecretCipher::new(MASTER_KEY),
        DispatcherConfig::default(),
    )
    .unwrap()
}
