use async_trait::async_trait;
use depot_core::models::{Job, WebhookDeliveryPayload, JOB_KIND_WEBHOOK_DELIVER};
use depot_core::JobError;
use depot_infra::{DeliveryReport, WebhookDeliveryEngine};
use tokio_util::sync::CancellationToken;

use crate::handler::JobHandler;

/// Handler for `webhook.deliver` jobs
pub struct WebhookDeliveryHandler {
    engine: WebhookDeliveryEngine,
}

impl WebhookDeliveryHandler {
    pub fn new(engine: WebhookDeliveryEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for WebhookDeliveryHandler {
    fn kind(&self) -> &'static str {
        JOB_KIND_WEBHOOK_DELIVER
    }

    async fn handle(&self, cancel: &CancellationToken, job: &Job) -> Result<(), JobError> {
        let payload: WebhookDeliveryPayload = job.decode()?;
        if payload.delivery_id.is_nil() {
            return Err(JobError::missing_identifier("delivery_id"));
        }

        match self.engine.deliver(cancel, payload.delivery_id).await? {
            DeliveryReport::Delivered { status_code } => {
                tracing::debug!(delivery_id = %payload.delivery_id, status_code, "Delivery job done");
            }
            DeliveryReport::AlreadyTerminal { status } => {
                tracing::debug!(delivery_id = %payload.delivery_id, %status, "Delivery job was a no-op");
            }
        }
        Ok(())
    }
}
