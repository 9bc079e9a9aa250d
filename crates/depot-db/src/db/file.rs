use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::models::{File, FileStatus};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::DbResult;
use crate::traits::{FileRepository, ListCursor};

/// Postgres-backed file repository
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select", db.record_id = %id))]
    async fn get_file(&self, id: Uuid) -> DbResult<Option<File>> {
        let file = sqlx::query_as::<Postgres, File>("SELECT * FROM files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<File>> {
        let files = sqlx::query_as::<Postgres, File>(
            r#"
            SELECT * FROM files
            WHERE tenant_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn update_status(&self, id: Uuid, status: FileStatus) -> DbResult<()> {
        sqlx::query("UPDATE files SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list_expired_soft_deleted(
        &self,
        older_than: DateTime<Utc>,
        after: Option<ListCursor>,
        limit: i64,
    ) -> DbResult<Vec<File>> {
        let files = sqlx::query_as::<Postgres, File>(
            r#"
            SELECT * FROM files
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
              AND ($2::timestamptz IS NULL OR (deleted_at, id) > ($2, $3::uuid))
            ORDER BY deleted_at ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(older_than)
        .bind(after.map(|c| c.at))
        .bind(after.map(|c| c.id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list_retention_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<ListCursor>,
        limit: i64,
    ) -> DbResult<Vec<File>> {
        let files = sqlx::query_as::<Postgres, File>(
            r#"
            SELECT * FROM files
            WHERE retention_until IS NOT NULL
              AND retention_until < $1
              AND deleted_at IS NULL
              AND ($2::timestamptz IS NULL OR (retention_until, id) > ($2, $3::uuid))
            ORDER BY retention_until ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(after.map(|c| c.at))
        .bind(after.map(|c| c.id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "delete", db.record_id = %id))]
    async fn hard_delete(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", db.record_id = %id))]
    async fn soft_delete(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
