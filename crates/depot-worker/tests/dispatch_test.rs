use async_trait::async_trait;
use bytes::Bytes;
use depot_core::models::{
    FileStatus, Job, TransformPayload, WebhookDeliveryPayload, JOB_KIND_FILE_TRANSFORM,
    JOB_KIND_WEBHOOK_DELIVER,
};
use depot_core::{CleanupConfig, StorageConfig, WebhookConfig, WorkerConfig};
use depot_db::test_helpers::fixtures::{
    create_pending_delivery, create_soft_deleted_file, create_test_file, create_test_webhook,
};
use depot_db::test_helpers::{MockFileRepository, MockWebhookRepository};
use depot_infra::{Backoff, FixedJitter, InMemoryMetrics, WebhookDeliveryEngine};
use depot_storage::keys::derivative_key;
use depot_storage::{MemoryStorage, Storage};
use depot_worker::{
    JobDispatcher, JobOutcome, MediaTransformer, OutputFormat, TransformError, WorkerRuntime,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Transformer double: echoes a tag, or fails the way it was told to
#[derive(Default)]
struct FakeTransformer {
    fail_with: Mutex<Option<fn() -> TransformError>>,
    calls: Mutex<Vec<(u32, u32, OutputFormat)>>,
}

#[async_trait]
impl MediaTransformer for FakeTransformer {
    async fn transform(
        &self,
        source: Bytes,
        _content_type: &str,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Result<Bytes, TransformError> {
        self.calls.lock().unwrap().push((width, height, format));
        if let Some(make) = *self.fail_with.lock().unwrap() {
            return Err(make());
        }
        let mut out = format!("{}x{}:", width, height).into_bytes();
        out.extend_from_slice(&source);
        Ok(Bytes::from(out))
    }
}

struct Harness {
    dispatcher: JobDispatcher,
    files: MockFileRepository,
    webhooks: MockWebhookRepository,
    storage: Arc<MemoryStorage>,
    transformer: Arc<FakeTransformer>,
}

fn config() -> WorkerConfig {
    WorkerConfig {
        database_url: "postgres://localhost/depot_test".to_string(),
        db_max_connections: 1,
        job_timeout: Duration::from_secs(10),
        webhook: WebhookConfig::default(),
        cleanup: CleanupConfig::default(),
        storage: StorageConfig::memory(),
    }
}

fn harness() -> Harness {
    let files = MockFileRepository::new();
    let webhooks = MockWebhookRepository::new();
    let storage = Arc::new(MemoryStorage::default());
    let transformer = Arc::new(FakeTransformer::default());

    let config = config();
    let engine = WebhookDeliveryEngine::new(
        Arc::new(webhooks.clone()),
        Arc::new(InMemoryMetrics::new()),
        config.webhook.clone(),
    )
    .unwrap()
    .with_backoff(Backoff::new(Arc::new(FixedJitter(0.5))));

    let dispatcher = WorkerRuntime::build_dispatcher(
        &config,
        engine,
        Arc::new(files.clone()),
        storage.clone(),
        transformer.clone(),
    );

    Harness {
        dispatcher,
        files,
        webhooks,
        storage,
        transformer,
    }
}

async fn put(storage: &dyn Storage, key: &str, content_type: &str, data: &'static [u8]) {
    storage
        .upload(
            key,
            Box::pin(std::io::Cursor::new(data)),
            content_type,
            Some(data.len() as u64),
        )
        .await
        .unwrap();
}

fn transform_job(file_id: Uuid, width: i32, height: i32, format: &str) -> Job {
    Job::with_payload(
        JOB_KIND_FILE_TRANSFORM,
        &TransformPayload {
            file_id,
            width,
            height,
            format: format.to_string(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_registered_kinds() {
    let h = harness();
    assert_eq!(
        h.dispatcher.kinds(),
        vec![JOB_KIND_FILE_TRANSFORM, JOB_KIND_WEBHOOK_DELIVER]
    );
}

#[tokio::test]
async fn test_webhook_job_success_completes() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let webhook = create_test_webhook(&format!("{}/events", server.url()), "secret");
    let delivery = create_pending_delivery(webhook.id, 0);
    let delivery_id = delivery.id;
    h.webhooks.insert_webhook(webhook);
    h.webhooks.insert_delivery(delivery);

    server
        .mock("POST", "/events")
        .with_status(202)
        .create_async()
        .await;

    let job = Job::with_payload(JOB_KIND_WEBHOOK_DELIVER, &WebhookDeliveryPayload { delivery_id })
        .unwrap();
    let outcome = h.dispatcher.dispatch(&CancellationToken::new(), &job).await;

    assert_eq!(outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_webhook_job_failure_retries_at_backoff() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let webhook = create_test_webhook(&format!("{}/events", server.url()), "secret");
    let delivery = create_pending_delivery(webhook.id, 3);
    let delivery_id = delivery.id;
    h.webhooks.insert_webhook(webhook);
    h.webhooks.insert_delivery(delivery);

    server
        .mock("POST", "/events")
        .with_status(500)
        .create_async()
        .await;

    let job = Job::with_payload(JOB_KIND_WEBHOOK_DELIVER, &WebhookDeliveryPayload { delivery_id })
        .unwrap();
    let outcome = h.dispatcher.dispatch(&CancellationToken::new(), &job).await;

    let stored = h.webhooks.delivery(delivery_id).unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Retry {
            retry_at: stored.next_retry_at
        }
    );
    assert!(stored.next_retry_at.is_some());
}

#[tokio::test]
async fn test_webhook_job_exhausted_is_discarded() {
    let mut server = mockito::Server::new_async().await;
    let h = harness();
    let webhook = create_test_webhook(&format!("{}/events", server.url()), "secret");
    let delivery = create_pending_delivery(webhook.id, 9);
    let delivery_id = delivery.id;
    h.webhooks.insert_webhook(webhook);
    h.webhooks.insert_delivery(delivery);

    server
        .mock("POST", "/events")
        .with_status(410)
        .create_async()
        .await;

    let job = Job::with_payload(JOB_KIND_WEBHOOK_DELIVER, &WebhookDeliveryPayload { delivery_id })
        .unwrap();
    let outcome = h.dispatcher.dispatch(&CancellationToken::new(), &job).await;

    assert_eq!(outcome, JobOutcome::Discard);
    assert_eq!(h.webhooks.dlq_entries().len(), 1);
}

#[tokio::test]
async fn test_malformed_job_is_discarded() {
    let h = harness();
    let job = Job::new(JOB_KIND_WEBHOOK_DELIVER, b"not json".to_vec());
    assert_eq!(
        h.dispatcher.dispatch(&CancellationToken::new(), &job).await,
        JobOutcome::Discard
    );
}

#[tokio::test]
async fn test_transform_renders_derivative() {
    let h = harness();
    let file = create_test_file(Uuid::new_v4());
    let source_key = file.storage_key().unwrap().to_string();
    put(h.storage.as_ref(), &source_key, "image/png", b"PNGDATA").await;
    h.files.insert(file.clone());

    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(file.id, 200, 100, "webp"))
        .await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(h.files.file(file.id).unwrap().status, FileStatus::Completed);

    let derived_key = derivative_key(&source_key, 200, 100, "webp");
    assert!(derived_key.ends_with(&format!("/derived/{}_200x100.webp", file.id)));
    let object = h.storage.download(&derived_key).await.unwrap();
    assert_eq!(object.content_type.as_deref(), Some("image/webp"));
    assert_eq!(object.bytes().await.unwrap(), Bytes::from_static(b"200x100:PNGDATA"));
    assert_eq!(
        h.transformer.calls.lock().unwrap().as_slice(),
        &[(200, 100, OutputFormat::WebP)]
    );
}

#[tokio::test]
async fn test_transform_corrupted_source_marks_failed() {
    let h = harness();
    let file = create_test_file(Uuid::new_v4());
    put(h.storage.as_ref(), file.storage_key().unwrap(), "image/png", b"garbage").await;
    h.files.insert(file.clone());
    *h.transformer.fail_with.lock().unwrap() =
        Some(|| TransformError::Corrupted("invalid PNG signature".to_string()));

    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(file.id, 64, 64, "png"))
        .await;

    assert_eq!(outcome, JobOutcome::Discard);
    assert_eq!(h.files.file(file.id).unwrap().status, FileStatus::Failed);
}

#[tokio::test]
async fn test_transform_transient_failure_retries() {
    let h = harness();
    let file = create_test_file(Uuid::new_v4());
    put(h.storage.as_ref(), file.storage_key().unwrap(), "image/png", b"png").await;
    h.files.insert(file.clone());
    *h.transformer.fail_with.lock().unwrap() =
        Some(|| TransformError::Failed("encoder busy".to_string()));

    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(file.id, 64, 64, "png"))
        .await;

    assert_eq!(outcome, JobOutcome::Retry { retry_at: None });
    assert_ne!(h.files.file(file.id).unwrap().status, FileStatus::Failed);
}

#[tokio::test]
async fn test_transform_missing_source_object_retries() {
    let h = harness();
    let file = create_test_file(Uuid::new_v4());
    h.files.insert(file.clone());

    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(file.id, 64, 64, "jpg"))
        .await;

    assert_eq!(outcome, JobOutcome::Retry { retry_at: None });
    assert!(h.transformer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transform_unsupported_source_type_is_discarded() {
    let h = harness();
    let mut file = create_test_file(Uuid::new_v4());
    file.content_type = "application/pdf".to_string();
    put(h.storage.as_ref(), file.storage_key().unwrap(), "application/pdf", b"%PDF").await;
    h.files.insert(file.clone());

    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(file.id, 64, 64, "png"))
        .await;

    assert_eq!(outcome, JobOutcome::Discard);
    assert_eq!(h.files.file(file.id).unwrap().status, FileStatus::Failed);
}

#[tokio::test]
async fn test_transform_invalid_request_is_discarded_without_lookup() {
    let h = harness();
    for job in [
        transform_job(Uuid::nil(), 10, 10, "png"),
        transform_job(Uuid::new_v4(), 0, 10, "png"),
        transform_job(Uuid::new_v4(), 10, 10, "bmp"),
    ] {
        assert_eq!(
            h.dispatcher.dispatch(&CancellationToken::new(), &job).await,
            JobOutcome::Discard
        );
    }
}

#[tokio::test]
async fn test_transform_unknown_file_retries() {
    let h = harness();
    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(Uuid::new_v4(), 10, 10, "png"))
        .await;
    assert_eq!(outcome, JobOutcome::Retry { retry_at: None });
}

#[tokio::test]
async fn test_transform_skips_deleted_file() {
    let h = harness();
    let file = create_soft_deleted_file(Uuid::new_v4(), chrono::Utc::now());
    h.files.insert(file.clone());

    let outcome = h
        .dispatcher
        .dispatch(&CancellationToken::new(), &transform_job(file.id, 10, 10, "png"))
        .await;

    assert_eq!(outcome, JobOutcome::Completed);
    assert!(h.transformer.calls.lock().unwrap().is_empty());
    assert_eq!(h.files.file(file.id).unwrap().status, FileStatus::Completed);
}
