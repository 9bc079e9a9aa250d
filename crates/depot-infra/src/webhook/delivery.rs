use anyhow::Context;
use chrono::Utc;
use depot_core::models::{DeliveryStatus, NewDlqEntry, Webhook, WebhookDelivery};
use depot_core::{JobError, WebhookConfig};
use depot_db::WebhookRepository;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::backoff::Backoff;
use super::signature::{sign_payload, SIGNATURE_HEADER, USER_AGENT, WEBHOOK_ID_HEADER};
use crate::metrics::{DeliveryOutcome, MetricsRecorder};

/// Result of a delivery invocation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// The endpoint answered 2xx and the delivery is now terminal
    Delivered { status_code: i32 },
    /// The delivery was already delivered or failed; nothing was sent
    AlreadyTerminal { status: DeliveryStatus },
}

/// Response of a single HTTP attempt. Transport failures use code 0 and
/// carry the error text as body.
struct AttemptResponse {
    status_code: i32,
    body: String,
}

impl AttemptResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Runs one delivery attempt per invocation and records its outcome
///
/// Non-2xx responses and transport errors are scheduled for retry with
/// exponential backoff until `max_retries` attempts, after which the delivery
/// is marked failed and copied to the dead-letter queue.
#[derive(Clone)]
pub struct WebhookDeliveryEngine {
    repo: Arc<dyn WebhookRepository>,
    metrics: Arc<dyn MetricsRecorder>,
    http_client: Client,
    backoff: Backoff,
    config: WebhookConfig,
}

impl WebhookDeliveryEngine {
    pub fn new(
        repo: Arc<dyn WebhookRepository>,
        metrics: Arc<dyn MetricsRecorder>,
        config: WebhookConfig,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client for webhooks")?;

        Ok(Self {
            repo,
            metrics,
            http_client,
            backoff: Backoff::default(),
            config,
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attempt delivery `delivery_id` once.
    ///
    /// A transient error carries the scheduled retry time in
    /// [`JobError::retry_at`]; exhaustion returns a permanent
    /// `RetriesExhausted` error.
    #[tracing::instrument(skip(self, cancel), fields(delivery_id = %delivery_id))]
    pub async fn deliver(
        &self,
        cancel: &CancellationToken,
        delivery_id: Uuid,
    ) -> Result<DeliveryReport, JobError> {
        let delivery = self
            .repo
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| JobError::not_found("Webhook delivery", delivery_id))?;

        if delivery.status.is_terminal() {
            tracing::info!(status = %delivery.status, "Delivery already terminal, skipping");
            return Ok(DeliveryReport::AlreadyTerminal {
                status: delivery.status,
            });
        }

        let webhook = self
            .repo
            .get_webhook(delivery.webhook_id)
            .await?
            .ok_or_else(|| JobError::not_found("Webhook", delivery.webhook_id))?;

        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Delivery cancelled before completion");
                return Err(JobError::cancelled());
            }
            response = self.send(&webhook, &delivery) => response?,
        };
        let elapsed = start.elapsed();

        if response.is_success() {
            let applied = self
                .repo
                .mark_delivered(delivery.id, response.status_code, &response.body)
                .await?;
            if !applied {
                tracing::warn!("Delivery became terminal concurrently");
            }

            self.metrics
                .record_delivery(DeliveryOutcome::Success, elapsed);
            tracing::info!(
                webhook_id = %webhook.id,
                status_code = response.status_code,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                "Webhook delivered successfully"
            );

            return Ok(DeliveryReport::Delivered {
                status_code: response.status_code,
            });
        }

        self.handle_failure(&delivery, response, elapsed).await
    }

    async fn handle_failure(
        &self,
        delivery: &WebhookDelivery,
        response: AttemptResponse,
        elapsed: Duration,
    ) -> Result<DeliveryReport, JobError> {
        let attempts = delivery.attempts + 1;
        let reason = if response.status_code == 0 {
            format!("Webhook request failed: {}", response.body)
        } else {
            format!("Webhook returned non-2xx status: {}", response.status_code)
        };

        if attempts >= self.config.max_retries {
            self.repo
                .mark_failed(delivery.id, attempts, response.status_code, &response.body)
                .await?;

            let error_message = format!(
                "Max retries ({}) exceeded: {}",
                self.config.max_retries, reason
            );
            let entry = NewDlqEntry::from_delivery(
                delivery,
                attempts,
                response.status_code,
                &response.body,
                error_message.clone(),
            );

            match self.repo.create_dlq_entry(entry).await {
                Ok(()) => self.metrics.record_delivery(DeliveryOutcome::Dlq, elapsed),
                Err(e) => {
                    tracing::error!(
                        webhook_id = %delivery.webhook_id,
                        error = %e,
                        "Failed to write dead-letter entry"
                    );
                    self.metrics
                        .record_delivery(DeliveryOutcome::DlqWriteFailed, elapsed);
                }
            }

            self.metrics
                .record_delivery(DeliveryOutcome::Failed, elapsed);
            tracing::error!(
                webhook_id = %delivery.webhook_id,
                attempts,
                status_code = response.status_code,
                "Webhook delivery failed permanently"
            );

            return Err(JobError::retries_exhausted(anyhow::anyhow!(error_message)));
        }

        let delay = self.backoff.delay((attempts - 1).max(0) as u32);
        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(4));

        self.repo
            .schedule_retry(
                delivery.id,
                attempts,
                next_retry_at,
                response.status_code,
                &response.body,
            )
            .await?;

        self.metrics
            .record_delivery(DeliveryOutcome::Retry, elapsed);
        tracing::warn!(
            webhook_id = %delivery.webhook_id,
            attempts,
            status_code = response.status_code,
            next_retry = %next_retry_at,
            "Webhook delivery failed, scheduled for retry"
        );

        Err(JobError::network(anyhow::anyhow!(reason)).with_retry_at(next_retry_at))
    }

    /// Send the signed request. Only signing can fail; transport errors are
    /// folded into the response.
    async fn send(
        &self,
        webhook: &Webhook,
        delivery: &WebhookDelivery,
    ) -> Result<AttemptResponse, JobError> {
        let timestamp = Utc::now().timestamp();
        let signature = sign_payload(&webhook.signing_secret, timestamp, &delivery.payload)
            .map_err(JobError::internal)?;

        let result = self
            .http_client
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header(WEBHOOK_ID_HEADER, delivery.id.to_string())
            .header(SIGNATURE_HEADER, signature)
            .body(delivery.payload.clone())
            .send()
            .await;

        let limit = self.config.max_response_bytes;
        match result {
            Ok(response) => {
                let status_code = i32::from(response.status().as_u16());
                let body = read_capped(response, limit).await;
                Ok(AttemptResponse { status_code, body })
            }
            Err(e) => Ok(AttemptResponse {
                status_code: 0,
                body: truncate_utf8(&e.to_string(), limit),
            }),
        }
    }
}

/// Read at most `limit` bytes of the response body. NUL bytes are dropped,
/// Postgres `TEXT` rejects them.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(limit.min(8 * 1024));
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read webhook response body");
                break;
            }
        }
    }
    buf.retain(|b| *b != 0);
    String::from_utf8_lossy(&buf).into_owned()
}

fn truncate_utf8(s: &str, limit: usize) -> String {
    let s = s.replace('\0', "");
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
