use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::models::{File, FileStatus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::traits::{FileRepository, ListCursor};

/// Mock file repository that keeps rows in memory
///
/// Queries follow the same filters and ordering as the Postgres repository.
/// Individual rows or whole listings can be made to fail.
#[derive(Clone, Default)]
pub struct MockFileRepository {
    files: Arc<Mutex<HashMap<Uuid, File>>>,
    failing_hard_deletes: Arc<Mutex<HashSet<Uuid>>>,
    failing_soft_deletes: Arc<Mutex<HashSet<Uuid>>>,
    fail_listing: Arc<Mutex<bool>>,
    listing_calls: Arc<Mutex<usize>>,
}

impl MockFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file: File) {
        self.files.lock().unwrap().insert(file.id, file);
    }

    /// Get a row (for test assertions)
    pub fn file(&self, id: Uuid) -> Option<File> {
        self.files.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `hard_delete` fail for this row
    pub fn fail_hard_delete(&self, id: Uuid) {
        self.failing_hard_deletes.lock().unwrap().insert(id);
    }

    /// Make `soft_delete` fail for this row
    pub fn fail_soft_delete(&self, id: Uuid) {
        self.failing_soft_deletes.lock().unwrap().insert(id);
    }

    /// Make every listing query fail
    pub fn set_fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    /// Number of listing queries issued so far
    pub fn listing_calls(&self) -> usize {
        *self.listing_calls.lock().unwrap()
    }

    fn check_listing(&self) -> DbResult<()> {
        *self.listing_calls.lock().unwrap() += 1;
        if *self.fail_listing.lock().unwrap() {
            return Err(DbError::Unavailable("listing query failed".to_string()));
        }
        Ok(())
    }
}

/// Order by `(timestamp, id)` and keep `limit` rows after the cursor
fn keyset_page(
    files: Vec<File>,
    at: impl Fn(&File) -> Option<DateTime<Utc>>,
    after: Option<ListCursor>,
    limit: i64,
) -> Vec<File> {
    let mut keyed: Vec<((DateTime<Utc>, Uuid), File)> = files
        .into_iter()
        .filter_map(|f| at(&f).map(|ts| ((ts, f.id), f)))
        .filter(|(key, _)| after.map_or(true, |c| *key > (c.at, c.id)))
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed
        .into_iter()
        .take(limit.max(0) as usize)
        .map(|(_, f)| f)
        .collect()
}

#[async_trait]
impl FileRepository for MockFileRepository {
    async fn get_file(&self, id: Uuid) -> DbResult<Option<File>> {
        Ok(self.file(id))
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<File>> {
        self.check_listing()?;
        let mut files: Vec<File> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.tenant_id == tenant_id && f.deleted_at.is_none())
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_status(&self, id: Uuid, status: FileStatus) -> DbResult<()> {
        if let Some(file) = self.files.lock().unwrap().get_mut(&id) {
            file.status = status;
            file.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_expired_soft_deleted(
        &self,
        older_than: DateTime<Utc>,
        after: Option<ListCursor>,
        limit: i64,
    ) -> DbResult<Vec<File>> {
        self.check_listing()?;
        let files: Vec<File> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.deleted_at.is_some_and(|at| at < older_than))
            .cloned()
            .collect();
        Ok(keyset_page(files, |f| f.deleted_at, after, limit))
    }

    async fn list_retention_expired(
        &self,
        now: DateTime<Utc>,
        after: Option<ListCursor>,
        limit: i64,
    ) -> DbResult<Vec<File>> {
        self.check_listing()?;
        let files: Vec<File> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.deleted_at.is_none() && f.retention_expired(now))
            .cloned()
            .collect();
        Ok(keyset_page(files, |f| f.retention_until, after, limit))
    }

    async fn hard_delete(&self, id: Uuid) -> DbResult<bool> {
        if self.failing_hard_deletes.lock().unwrap().contains(&id) {
            return Err(DbError::Unavailable(format!("hard delete of {} failed", id)));
        }
        Ok(self.files.lock().unwrap().remove(&id).is_some())
    }

    async fn soft_delete(&self, id: Uuid) -> DbResult<bool> {
        if self.failing_soft_deletes.lock().unwrap().contains(&id) {
            return Err(DbError::Unavailable(format!("soft delete of {} failed", id)));
        }
        let mut files = self.files.lock().unwrap();
        match files.get_mut(&id) {
            Some(file) if file.deleted_at.is_none() => {
                let now = Utc::now();
                file.deleted_at = Some(now);
                file.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
