//! Integration tests for webhook delivery: signing, bounded retries, and
//! per-destination independence.

mod common;

use std::sync::Arc;

use common::*;
use orvia_core::TenantId;
use orvia_store::MemoryStore;
use orvia_webhooks::crypto::verify_signature;
use orvia_webhooks::{DeliveryWorker, EventPublisher, WebhookEvent, SIGNATURE_HEADER};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

fn contact_created(tenant_id: TenantId) -> WebhookEvent {
    WebhookEvent::new(
        tenant_id,
        "contact.created",
        serde_json::json!({"contact_id": "c-42", "email": "new@example.com"}),
    )
}

#[tokio::test]
async fn signed_delivery_carries_verifiable_signature() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::ok();
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    insert_webhook(
        &store,
        &cipher,
        tenant,
        &format!("{}/hook", mock_server.uri()),
        &["contact.created"],
        true,
    )
    .await;

    let outcomes = dispatcher(store).dispatch(&contact_created(tenant)).await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].delivered);
    assert!(outcomes[0].signed);
    assert_eq!(outcomes[0].attempts.len(), 1);

    let requests = capture.requests();
    assert_eq!(requests.len(), 1);

    // Signature verifies over the exact body bytes
    let header = requests[0].header(SIGNATURE_HEADER).unwrap();
    let signature = header.strip_prefix("sha256=").unwrap();
    assert!(verify_signature(signature, SECRET, &requests[0].body));

    // Body is the documented envelope
    let body = requests[0].body_json();
    assert_eq!(body["trigger"], "contact.created");
    assert!(body["createdAt"].is_string());
    assert_eq!(body["payload"]["contact_id"], "c-42");
}

#[tokio::test]
async fn destination_without_secret_is_delivered_unsigned() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::ok();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    insert_webhook(
        &store,
        &cipher,
        tenant,
        &mock_server.uri(),
        &["contact.created"],
        false,
    )
    .await;

    let outcomes = dispatcher(store).dispatch(&contact_created(tenant)).await;

    assert!(outcomes[0].delivered);
    assert!(!outcomes[0].signed);
    assert!(capture.requests()[0].header(SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn failing_destination_gets_exactly_three_attempts() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::with_status(500);
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    insert_webhook(
        &store,
        &cipher,
        tenant,
        &mock_server.uri(),
        &["contact.created"],
        true,
    )
    .await;

    let outcomes = dispatcher(store).dispatch(&contact_created(tenant)).await;

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].delivered);
    assert_eq!(outcomes[0].attempts.len(), 3);
    assert_eq!(capture.request_count(), 3);
    assert!(outcomes[0]
        .attempts
        .iter()
        .all(|a| a.status == Some(500)));
}

#[tokio::test]
async fn retries_stop_on_first_success() {
    let mock_server = MockServer::start().await;
    let failing = FailingResponder::fail_times(1);
    Mock::given(method("POST"))
        .respond_with(failing.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    insert_webhook(
        &store,
        &cipher,
        tenant,
        &mock_server.uri(),
        &["contact.created"],
        false,
    )
    .await;

    let outcomes = dispatcher(store).dispatch(&contact_created(tenant)).await;

    assert!(outcomes[0].delivered);
    assert_eq!(outcomes[0].attempts.len(), 2);
    assert_eq!(failing.attempt_count(), 2);
}

#[tokio::test]
async fn one_failing_destination_does_not_affect_healthy_ones() {
    let mock_server = MockServer::start().await;
    let healthy_a = CaptureResponder::ok();
    let healthy_b = CaptureResponder::ok();
    let broken = CaptureResponder::with_status(500);

    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(healthy_a.clone())
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(healthy_b.clone())
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(broken.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    for suffix in ["/a", "/broken", "/b"] {
        insert_webhook(
            &store,
            &cipher,
            tenant,
            &format!("{}{suffix}", mock_server.uri()),
            &["contact.created"],
            true,
        )
        .await;
    }

    let outcomes = dispatcher(store).dispatch(&contact_created(tenant)).await;

    assert_eq!(outcomes.len(), 3);
    // Exactly one successful attempt per healthy destination
    assert_eq!(healthy_a.request_count(), 1);
    assert_eq!(healthy_b.request_count(), 1);
    // Bounded retry against the broken one
    assert_eq!(broken.request_count(), 3);

    let delivered: Vec<bool> = outcomes.iter().map(|o| o.delivered).collect();
    assert_eq!(delivered.iter().filter(|d| **d).count(), 2);
}

#[tokio::test]
async fn transport_error_counts_as_failed_attempt() {
    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    // Nothing listens on port 9; every attempt is a connect error
    insert_webhook(
        &store,
        &cipher,
        tenant,
        "http://127.0.0.1:9/hook",
        &["contact.created"],
        false,
    )
    .await;

    let outcomes = dispatcher(store).dispatch(&contact_created(tenant)).await;

    assert!(!outcomes[0].delivered);
    assert_eq!(outcomes[0].attempts.len(), 3);
    assert!(outcomes[0]
        .attempts
        .iter()
        .all(|a| a.status.is_none() && a.error.is_some()));
}

#[tokio::test]
async fn unsubscribed_trigger_and_foreign_tenant_are_skipped() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::ok();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    insert_webhook(
        &store,
        &cipher,
        tenant,
        &mock_server.uri(),
        &["deal.won"],
        false,
    )
    .await;

    let dispatcher = dispatcher(store);

    // Trigger the webhook does not subscribe to
    let outcomes = dispatcher.dispatch(&contact_created(tenant)).await;
    assert!(outcomes.is_empty());

    // Matching trigger but a different tenant
    let outcomes = dispatcher
        .dispatch(&WebhookEvent::new(
            TenantId::new(),
            "deal.won",
            serde_json::Value::Null,
        ))
        .await;
    assert!(outcomes.is_empty());

    assert_eq!(capture.request_count(), 0);
}

#[tokio::test]
async fn publisher_and_worker_deliver_without_blocking_caller() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::ok();
    Mock::given(method("POST"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let tenant = TenantId::new();
    let cipher = orvia_auth::SecretCipher::new(MASTER_KEY);
    insert_webhook(
        &store,
        &cipher,
        tenant,
        &mock_server.uri(),
        &["contact.created"],
        true,
    )
    .await;

    let (publisher, receiver) = EventPublisher::new(16);
    let worker = DeliveryWorker::new(Arc::new(dispatcher(store)));
    let handle = worker.spawn(receiver);

    // The publishing side returns immediately
    publisher.publish(contact_created(tenant));

    // Delivery happens asynchronously; poll until it lands
    for _ in 0..200 {
        if capture.request_count() >= 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(capture.request_count(), 1);

    drop(publisher);
    let _ = handle.await;
}
