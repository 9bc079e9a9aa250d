//! Repository trait abstractions
//!
//! These traits define the interface the worker handlers and the cleanup
//! sweeper need from the database, so they can be tested without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::models::{File, FileStatus, NewDlqEntry, Webhook, WebhookDelivery};
use uuid::Uuid;

use crate::error::DbResult;

/// Keyset position in a timestamp-ordered file listing
///
/// Rows at or before `(at, id)` are skipped, so rows that keep failing
/// cannot hold back the ones behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListCursor {
    pub at: DateTime<Utc>,
    pub id: Uuid,
}

/// File record operations
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Get a file by ID, including soft-deleted rows
    async fn get_file(&self, id: Uuid) -> DbResult<Option<File>>;

    /// List a tenant's live files, newest first
    async fn list_by_tenant(&self, tenant_id: Uuid, limit: i64, offset: i64)
        -> DbResult<Vec<File>>;

    async fn update_status(&self, id: Uuid, status: FileStatus) -> DbResult<()>;

    /// Soft-deleted files whose `deleted_at` is older than `older_than`,
    /// ordered by `(deleted_at, id)` and starting strictly after `after`
    async fn list_expired_soft_deleted(
        &self,
        older_than: DateTime<Utc>,
        after: Option<ListCursor>,
        limit: i64,
    ) -> DbResult<Vec<File>>;

    /// Live files whose retention deadline is before `now`, ordered by
    /// `(retention_until, id)` and starting strictly after `after`
    async fn list_retention_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<ListCursor>,
        limit: i64,
    ) -> DbResult<Vec<File>>;

    /// Remove the row. Returns false when it was already gone.
    async fn hard_delete(&self, id: Uuid) -> DbResult<bool>;

    /// Set the soft-delete marker. Returns false when it was already set.
    async fn soft_delete(&self, id: Uuid) -> DbResult<bool>;
}

/// Webhook and delivery bookkeeping
///
/// The `mark_*` and `schedule_retry` updates only apply to deliveries that
/// are still pending; they return false when the row was already terminal.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn get_webhook(&self, id: Uuid) -> DbResult<Option<Webhook>>;

    async fn get_delivery(&self, id: Uuid) -> DbResult<Option<WebhookDelivery>>;

    async fn mark_delivered(&self, id: Uuid, response_code: i32, response_body: &str)
        -> DbResult<bool>;

    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool>;

    async fn schedule_retry(
        &self,
        id: Uuid,
        attempts: i32,
        next_retry_at: DateTime<Utc>,
        response_code: i32,
        response_body: &str,
    ) -> DbResult<bool>;

    async fn create_dlq_entry(&self, entry: NewDlqEntry) -> DbResult<()>;
}
