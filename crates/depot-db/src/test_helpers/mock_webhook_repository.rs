use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::models::{DeliveryStatus, NewDlqEntry, Webhook, WebhookDelivery};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::traits::WebhookRepository;

/// Mock webhook repository that keeps rows in memory
///
/// Updates honour the same pending-only guard as the Postgres repository,
/// reject text containing NUL bytes the way a Postgres `TEXT` column does,
/// and every call is counted so tests can assert on writes.
#[derive(Clone, Default)]
pub struct MockWebhookRepository {
    webhooks: Arc<Mutex<HashMap<Uuid, Webhook>>>,
    deliveries: Arc<Mutex<HashMap<Uuid, WebhookDelivery>>>,
    dlq: Arc<Mutex<Vec<NewDlqEntry>>>,
    fail_dlq: Arc<Mutex<bool>>,
    fail_lookups: Arc<Mutex<bool>>,
    writes: Arc<Mutex<usize>>,
}

impl MockWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_webhook(&self, webhook: Webhook) {
        self.webhooks.lock().unwrap().insert(webhook.id, webhook);
    }

    pub fn insert_delivery(&self, delivery: WebhookDelivery) {
        self.deliveries.lock().unwrap().insert(delivery.id, delivery);
    }

    /// Get a delivery (for test assertions)
    pub fn delivery(&self, id: Uuid) -> Option<WebhookDelivery> {
        self.deliveries.lock().unwrap().get(&id).cloned()
    }

    pub fn dlq_entries(&self) -> Vec<NewDlqEntry> {
        self.dlq.lock().unwrap().clone()
    }

    /// Number of delivery updates and DLQ inserts issued
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Make `create_dlq_entry` fail
    pub fn set_fail_dlq(&self, fail: bool) {
        *self.fail_dlq.lock().unwrap() = fail;
    }

    /// Make `get_webhook` and `get_delivery` fail
    pub fn set_fail_lookups(&self, fail: bool) {
        *self.fail_lookups.lock().unwrap() = fail;
    }

    fn check_lookup(&self) -> DbResult<()> {
        if *self.fail_lookups.lock().unwrap() {
            return Err(DbError::Unavailable("lookup failed".to_string()));
        }
        Ok(())
    }

    fn check_text(value: &str) -> DbResult<()> {
        if value.contains('\0') {
            return Err(DbError::Unavailable(
                "invalid byte sequence for encoding \"UTF8\": 0x00".to_string(),
            ));
        }
        Ok(())
    }

    fn update_pending<F>(&self, id: Uuid, response_body: &str, apply: F) -> DbResult<bool>
    where
        F: FnOnce(&mut WebhookDelivery),
    {
        *self.writes.lock().unwrap() += 1;
        Self::check_text(response_body)?;
        let mut deliveries = self.deliveries.lock().unwrap();
        match deliveries.get_mut(&id) {
            Some(delivery) if delivery.status == DeliveryStatus::Pending => {
                apply(delivery);
                delivery.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WebhookRepository for MockWebhookRepository {
    async fn get_webhook(&self, id: Uuid) -> DbResult<Option<Webhook>> {
        self.check_lookup()?;
        Ok(self.webhooks.lock().unwrap().get(&id).cloned())
    }

    async fn get_delivery(&self, id: Uuid) -> DbResult<Option<WebhookDelivery>> {
        self.check_lookup()?;
        Ok(self.delivery(id))
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool> {
        self.update_pending(id, response_body, |d| {
            d.status = DeliveryStatus::Delivered;
            d.attempts += 1;
            d.last_response_code = Some(response_code);
            d.last_response_body = Some(response_body.to_string());
            d.next_retry_at = None;
            d.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool> {
        self.update_pending(id, response_body, |d| {
            d.status = DeliveryStatus::Failed;
            d.attempts = attempts;
            d.last_response_code = Some(response_code);
            d.last_response_body = Some(response_body.to_string());
            d.next_retry_at = None;
            d.completed_at = Some(Utc::now());
        })
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool> {
        self.update_pending(id, response_body, |d| {
            d.attempts = attempts;
            d.next_retry_at = Some(next_retry_at);
            d.last_response_code = Some(response_code);
            d.last_response_body = Some(response_body.to_string());
        })
    }

    async fn create_dlq_entry(&self, entry: NewDlqEntry) -> DbResult<()> {
        *self.writes.lock().unwrap() += 1;
        if *self.fail_dlq.lock().unwrap() {
            return Err(DbError::Unavailable("dlq insert failed".to_string()));
        }
        Self::check_text(&entry.error_message)?;
        if let Some(body) = &entry.last_response_body {
            Self::check_text(body)?;
        }
        let mut dlq = self.dlq.lock().unwrap();
        if !dlq.iter().any(|e| e.delivery_id == entry.delivery_id) {
            dlq.push(entry);
        }
        Ok(())
    }
}
