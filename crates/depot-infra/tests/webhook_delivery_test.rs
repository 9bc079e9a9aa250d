use chrono::Utc;
use depot_core::models::DeliveryStatus;
use depot_core::{ErrorKind, WebhookConfig};
use depot_db::test_helpers::fixtures::{create_pending_delivery, create_test_webhook};
use depot_db::test_helpers::MockWebhookRepository;
use depot_infra::webhook::signature::verify_signature;
use depot_infra::{
    Backoff, DeliveryOutcome, DeliveryReport, FixedJitter, InMemoryMetrics, WebhookDeliveryEngine,
};
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Harness {
    repo: MockWebhookRepository,
    metrics: Arc<InMemoryMetrics>,
    engine: WebhookDeliveryEngine,
}

fn harness() -> Harness {
    let repo = MockWebhookRepository::new();
    let metrics = Arc::new(InMemoryMetrics::new());
    let config = WebhookConfig {
        timeout: Duration::from_secs(5),
        ..WebhookConfig::default()
    };
    let engine = WebhookDeliveryEngine::new(Arc::new(repo.clone()), metrics.clone(), config)
        .unwrap()
        .with_backoff(Backoff::new(Arc::new(FixedJitter(0.5))));
    Harness {
        repo,
        metrics,
        engine,
    }
}

/// Insert a webhook pointing at `url` with one pending delivery that has
/// already been attempted `attempts` times.
fn seed(repo: &MockWebhookRepository, url: &str, attempts: i32) -> (Uuid, Vec<u8>) {
    let webhook = create_test_webhook(url, "whsec_test");
    let delivery = create_pending_delivery(webhook.id, attempts);
    let id = delivery.id;
    let payload = delivery.payload.clone();
    repo.insert_webhook(webhook);
    repo.insert_delivery(delivery);
    (id, payload)
}

#[tokio::test]
async fn test_success_marks_delivered() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, payload) = seed(&h.repo, &format!("{}/hook", server.url()), 0);

    let mock = server
        .mock("POST", "/hook")
        .match_header("content-type", "application/json")
        .match_header("user-agent", "depot-webhook/1.0")
        .match_header("x-webhook-id", id.to_string().as_str())
        .match_header(
            "x-webhook-signature",
            Matcher::Regex(r"^v1=[0-9a-f]{64},t=\d+$".to_string()),
        )
        .match_body(Matcher::Exact(String::from_utf8(payload).unwrap()))
        .with_status(200)
        .with_body("ok")
        .expect(1)
        .create_async()
        .await;

    let report = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(report, DeliveryReport::Delivered { status_code: 200 });

    let stored = h.repo.delivery(id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Delivered);
    assert_eq!(stored.last_response_code, Some(200));
    assert_eq!(stored.last_response_body.as_deref(), Some("ok"));
    assert!(stored.completed_at.is_some());
    assert_eq!(h.metrics.delivery_count(DeliveryOutcome::Success), 1);
}

#[tokio::test]
async fn test_signature_verifies_with_secret() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, payload) = seed(&h.repo, &format!("{}/hook", server.url()), 0);

    let captured = Arc::new(std::sync::Mutex::new(None::<String>));
    let sink = captured.clone();
    let mock = server
        .mock("POST", "/hook")
        .with_status(204)
        .with_body_from_request(move |request| {
            let header = request
                .header("x-webhook-signature")
                .first()
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *sink.lock().unwrap() = header;
            Vec::new()
        })
        .create_async()
        .await;

    h.engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap();
    mock.assert_async().await;

    let header = captured.lock().unwrap().clone().unwrap();
    verify_signature(
        "whsec_test",
        &header,
        &payload,
        Utc::now().timestamp(),
        Duration::from_secs(300),
    )
    .unwrap();
}

#[tokio::test]
async fn test_response_body_truncated_to_limit() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, _) = seed(&h.repo, &format!("{}/hook", server.url()), 0);

    server
        .mock("POST", "/hook")
        .with_status(200)
        .with_body("x".repeat(5000))
        .create_async()
        .await;

    h.engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap();

    let body = h.repo.delivery(id).unwrap().last_response_body.unwrap();
    assert_eq!(body.len(), 1024);
}

#[tokio::test]
async fn test_nul_bytes_dropped_from_stored_body() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, _) = seed(&h.repo, &format!("{}/hook", server.url()), 0);

    server
        .mock("POST", "/hook")
        .with_status(200)
        .with_body(b"ok\0\0done\0".to_vec())
        .create_async()
        .await;

    let report = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap();

    assert_eq!(report, DeliveryReport::Delivered { status_code: 200 });
    let stored = h.repo.delivery(id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Delivered);
    assert_eq!(stored.last_response_body.as_deref(), Some("okdone"));
}

#[tokio::test]
async fn test_binary_failure_body_still_reaches_dlq() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, _) = seed(&h.repo, &format!("{}/hook", server.url()), 9);

    server
        .mock("POST", "/hook")
        .with_status(502)
        .with_body(vec![0x00, 0xff, b'b', b'a', b'd', 0x00])
        .create_async()
        .await;

    let err = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
    let stored = h.repo.delivery(id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempts, 10);
    assert!(!stored.last_response_body.unwrap().contains('\0'));

    let dlq = h.repo.dlq_entries();
    assert_eq!(dlq.len(), 1);
    assert!(!dlq[0].last_response_body.as_deref().unwrap().contains('\0'));
}

#[tokio::test]
async fn test_failures_below_limit_schedule_retry() {
    for prior_attempts in 0..9 {
        let mut server = mockito::Server::new_async().await;
        let h = harness();
        let (id, _) = seed(&h.repo, &format!("{}/hook", server.url()), prior_attempts);

        server
            .mock("POST", "/hook")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let before = Utc::now();
        let err = h
            .engine
            .deliver(&CancellationToken::new(), id)
            .await
            .unwrap_err();

        assert!(!err.is_permanent(), "attempt {} must be retryable", prior_attempts + 1);
        let retry_at = err.retry_at().expect("retry hint");

        let stored = h.repo.delivery(id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Pending);
        assert_eq!(stored.attempts, prior_attempts + 1);
        assert_eq!(stored.last_response_code, Some(503));
        assert_eq!(stored.next_retry_at, Some(retry_at));
        assert!(retry_at > before);

        // FixedJitter(0.5) yields exactly min(30s * 2^(attempts-1), 4h)
        let expected = (30i64 << prior_attempts).min(4 * 60 * 60);
        let offset = (retry_at - before).num_seconds();
        assert!(
            offset >= expected - 1 && offset <= expected + 5,
            "attempt {}: offset {}s, expected ~{}s",
            prior_attempts + 1,
            offset,
            expected
        );

        assert!(h.repo.dlq_entries().is_empty());
        assert_eq!(h.metrics.delivery_count(DeliveryOutcome::Retry), 1);
    }
}

#[tokio::test]
async fn test_tenth_failure_goes_to_dlq_once() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, payload) = seed(&h.repo, &format!("{}/hook", server.url()), 9);

    server
        .mock("POST", "/hook")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let err = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);

    let stored = h.repo.delivery(id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempts, 10);

    let dlq = h.repo.dlq_entries();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].delivery_id, id);
    assert_eq!(dlq[0].attempts, 10);
    assert_eq!(dlq[0].last_response_code, Some(500));
    assert_eq!(dlq[0].payload, payload);

    // A redelivered job finds the delivery terminal and does nothing
    let writes = h.repo.write_count();
    let report = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap();
    assert_eq!(
        report,
        DeliveryReport::AlreadyTerminal {
            status: DeliveryStatus::Failed
        }
    );
    assert_eq!(h.repo.write_count(), writes);
    assert_eq!(h.repo.dlq_entries().len(), 1);
}

#[tokio::test]
async fn test_dlq_write_failure_is_not_escalated() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, _) = seed(&h.repo, &format!("{}/hook", server.url()), 9);
    h.repo.set_fail_dlq(true);

    server
        .mock("POST", "/hook")
        .with_status(500)
        .create_async()
        .await;

    let err = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
    assert_eq!(h.repo.delivery(id).unwrap().status, DeliveryStatus::Failed);
    assert_eq!(
        h.metrics.delivery_count(DeliveryOutcome::DlqWriteFailed),
        1
    );
}

#[tokio::test]
async fn test_connection_failure_recorded_as_code_zero() {
    let h = harness();
    // Nothing listens on port 1
    let (id, _) = seed(&h.repo, "http://127.0.0.1:1/hook", 0);

    let err = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap_err();

    assert!(!err.is_permanent());
    let stored = h.repo.delivery(id).unwrap();
    assert_eq!(stored.last_response_code, Some(0));
    assert!(!stored.last_response_body.unwrap_or_default().is_empty());
    assert_eq!(stored.attempts, 1);
}

#[tokio::test]
async fn test_terminal_delivery_is_noop() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let webhook = create_test_webhook(&format!("{}/hook", server.url()), "s");
    let mut delivery = create_pending_delivery(webhook.id, 3);
    delivery.status = DeliveryStatus::Delivered;
    let id = delivery.id;
    h.repo.insert_webhook(webhook);
    h.repo.insert_delivery(delivery);

    let mock = server
        .mock("POST", "/hook")
        .expect(0)
        .create_async()
        .await;

    let report = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(
        report,
        DeliveryReport::AlreadyTerminal {
            status: DeliveryStatus::Delivered
        }
    );
    assert_eq!(h.repo.write_count(), 0);
}

#[tokio::test]
async fn test_missing_delivery_is_transient() {
    let h = harness();
    let err = h
        .engine
        .deliver(&CancellationToken::new(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_lookup_failure_is_transient() {
    let h = harness();
    let (id, _) = seed(&h.repo, "http://127.0.0.1:1/hook", 0);
    h.repo.set_fail_lookups(true);

    let err = h
        .engine
        .deliver(&CancellationToken::new(), id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Database);
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_cancelled_delivery_is_not_mutated() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let (id, _) = seed(&h.repo, &format!("{}/hook", server.url()), 2);

    let mock = server
        .mock("POST", "/hook")
        .expect(0)
        .create_async()
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h.engine.deliver(&cancel, id).await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!err.is_permanent());
    let stored = h.repo.delivery(id).unwrap();
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.status, DeliveryStatus::Pending);
    assert_eq!(h.repo.write_count(), 0);
}
