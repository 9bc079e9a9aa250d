use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::models::{NewDlqEntry, Webhook, WebhookDelivery};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::DbResult;
use crate::traits::WebhookRepository;

/// Postgres-backed webhook and delivery repository
#[derive(Clone)]
pub struct PgWebhookRepository {
    pool: PgPool,
}

impl PgWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    #[tracing::instrument(skip(self), fields(db.table = "webhooks", db.operation = "select", db.record_id = %id))]
    async fn get_webhook(&self, id: Uuid) -> DbResult<Option<Webhook>> {
        let webhook = sqlx::query_as::<Postgres, Webhook>("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(webhook)
    }

    #[tracing::instrument(skip(self), fields(db.table = "webhook_deliveries", db.operation = "select", db.record_id = %id))]
    async fn get_delivery(&self, id: Uuid) -> DbResult<Option<WebhookDelivery>> {
        let delivery = sqlx::query_as::<Postgres, WebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }

    #[tracing::instrument(skip(self, response_body), fields(db.table = "webhook_deliveries", db.operation = "update", db.record_id = %id))]
    async fn mark_delivered(
        &self,
        id: Uuid,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'delivered',
                attempts = attempts + 1,
                last_response_code = $2,
                last_response_body = $3,
                next_retry_at = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(response_code)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, response_body), fields(db.table = "webhook_deliveries", db.operation = "update", db.record_id = %id))]
    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'failed',
                attempts = $2,
                last_response_code = $3,
                last_response_body = $4,
                next_retry_at = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(response_code)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, response_body), fields(db.table = "webhook_deliveries", db.operation = "update", db.record_id = %id))]
    async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET attempts = $2,
                next_retry_at = $3,
                last_response_code = $4,
                last_response_body = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(next_retry_at)
        .bind(response_code)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, entry), fields(db.table = "webhook_dlq", db.operation = "insert", delivery_id = %entry.delivery_id))]
    async fn create_dlq_entry(&self, entry: NewDlqEntry) -> DbResult<()> {
        // One entry per delivery; a replayed escalation is a no-op
        sqlx::query(
            r#"
            INSERT INTO webhook_dlq (
                webhook_id, delivery_id, event_type, payload, error_message,
                attempts, last_response_code, last_response_body
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (delivery_id) DO NOTHING
            "#,
        )
        .bind(entry.webhook_id)
        .bind(entry.delivery_id)
        .bind(entry.event_type)
        .bind(&entry.payload)
        .bind(&entry.error_message)
        .bind(entry.attempts)
        .bind(entry.last_response_code)
        .bind(&entry.last_response_body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
