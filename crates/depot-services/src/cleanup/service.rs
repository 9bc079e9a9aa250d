use anyhow::Context;
use chrono::Utc;
use depot_core::models::File;
use depot_core::CleanupConfig;
use depot_db::{FileRepository, ListCursor};
use depot_infra::{DeletionOutcome, MetricsRecorder};
use depot_storage::Storage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Counters for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Soft-deleted rows purged after the grace period
    pub soft_deleted_cleaned: u64,
    /// Live rows soft-deleted because their retention ended
    pub retention_expired: u64,
    pub storage_errors: u64,
    pub database_errors: u64,
}

/// Handle to a running periodic sweeper
pub struct CleanupHandle {
    shutdown_tx: mpsc::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the loop after the current sweep and wait for it to exit
    pub async fn shutdown(self) {
        if let Err(e) = self.shutdown_tx.send(()).await {
            tracing::warn!(error = %e, "Failed to send shutdown signal to cleanup service");
        }
        if let Err(e) = self.join_handle.await {
            tracing::error!(error = %e, "Cleanup service task panicked");
        }
    }
}

/// Two-stage file retention sweeper
///
/// A file whose retention deadline has passed is first soft-deleted (its
/// object removed, its row hidden). Once a soft-deleted row is older than the
/// grace period, the row is purged. Individual row failures are counted and
/// skipped; only a failing listing query fails the sweep.
#[derive(Clone)]
pub struct CleanupService {
    file_repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    metrics: Arc<dyn MetricsRecorder>,
    config: CleanupConfig,
}

enum Pass {
    SoftDeleted,
    RetentionExpired,
}

impl CleanupService {
    pub fn new(
        file_repository: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        metrics: Arc<dyn MetricsRecorder>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            file_repository,
            storage,
            metrics,
            config,
        }
    }

    /// Start the background sweep loop, running every `config.interval`
    pub fn start(self: Arc<Self>) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let join_handle = tokio::spawn(async move {
            let mut cleanup_interval = interval(self.config.interval);

            tracing::info!(
                interval_seconds = self.config.interval.as_secs(),
                batch_size = self.config.batch_size,
                "Cleanup service started"
            );

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        tracing::info!("Starting scheduled cleanup of expired files");

                        match self.run().await {
                            Ok(stats) => tracing::info!(?stats, "Cleanup task completed successfully"),
                            Err(e) => tracing::error!(error = %e, "Cleanup task failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Cleanup service shutting down");
                        break;
                    }
                }
            }
        });

        CleanupHandle {
            shutdown_tx,
            join_handle,
        }
    }

    /// Run one full sweep: purge expired soft-deleted rows, then soft-delete
    /// retention-expired rows.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "sweep"))]
    pub async fn run(&self) -> anyhow::Result<SweepStats> {
        let mut stats = SweepStats::default();

        self.sweep(Pass::SoftDeleted, &mut stats)
            .await
            .context("Failed to list expired soft-deleted files")?;
        self.sweep(Pass::RetentionExpired, &mut stats)
            .await
            .context("Failed to list retention-expired files")?;

        tracing::info!(
            soft_deleted_cleaned = stats.soft_deleted_cleaned,
            retention_expired = stats.retention_expired,
            storage_errors = stats.storage_errors,
            database_errors = stats.database_errors,
            "Cleanup completed"
        );

        Ok(stats)
    }

    /// Page through one pass with a keyset cursor until a short page. Rows
    /// that fail stay behind the cursor, so they never block later rows.
    async fn sweep(&self, pass: Pass, stats: &mut SweepStats) -> anyhow::Result<()> {
        let batch_size = self.config.batch_size.max(1);
        let now = Utc::now();
        let mut cursor: Option<ListCursor> = None;

        loop {
            let page = match pass {
                Pass::SoftDeleted => {
                    self.file_repository
                        .list_expired_soft_deleted(now - self.config.grace_period, cursor, batch_size)
                        .await?
                }
                Pass::RetentionExpired => {
                    self.file_repository
                        .list_retention_expired(now, cursor, batch_size)
                        .await?
                }
            };
            let fetched = page.len();

            for file in &page {
                match pass {
                    Pass::SoftDeleted => self.purge(file, stats).await,
                    Pass::RetentionExpired => self.expire(file, stats).await,
                }
            }

            if (fetched as i64) < batch_size {
                return Ok(());
            }

            let next = page.last().and_then(|file| {
                let at = match pass {
                    Pass::SoftDeleted => file.deleted_at,
                    Pass::RetentionExpired => file.retention_until,
                }?;
                Some(ListCursor { at, id: file.id })
            });
            // A cursor that does not advance would return the same page
            if next.is_none() || next == cursor {
                return Ok(());
            }
            cursor = next;
        }
    }

    /// Delete the object then the row of a soft-deleted file
    async fn purge(&self, file: &File, stats: &mut SweepStats) {
        self.delete_object(file, stats).await;

        match self.file_repository.hard_delete(file.id).await {
            Ok(true) => {
                stats.soft_deleted_cleaned += 1;
                self.metrics.record_file_deletion(DeletionOutcome::Purged);
                tracing::debug!(file_id = %file.id, "Purged soft-deleted file");
            }
            Ok(false) => {
                tracing::debug!(file_id = %file.id, "File row already removed");
            }
            Err(e) => {
                stats.database_errors += 1;
                self.metrics
                    .record_file_deletion(DeletionOutcome::DatabaseError);
                tracing::error!(
                    error = %e,
                    file_id = %file.id,
                    "Failed to delete from database"
                );
            }
        }
    }

    /// Delete the object then soft-delete the row of a retention-expired file
    async fn expire(&self, file: &File, stats: &mut SweepStats) {
        tracing::info!(
            file_id = %file.id,
            tenant_id = %file.tenant_id,
            retention_until = ?file.retention_until,
            "Expiring file past retention"
        );

        self.delete_object(file, stats).await;

        match self.file_repository.soft_delete(file.id).await {
            Ok(true) => {
                stats.retention_expired += 1;
                self.metrics.record_file_deletion(DeletionOutcome::Expired);
            }
            Ok(false) => {
                tracing::debug!(file_id = %file.id, "File already soft-deleted");
            }
            Err(e) => {
                stats.database_errors += 1;
                self.metrics
                    .record_file_deletion(DeletionOutcome::DatabaseError);
                tracing::error!(
                    error = %e,
                    file_id = %file.id,
                    "Failed to soft-delete file"
                );
            }
        }
    }

    async fn delete_object(&self, file: &File, stats: &mut SweepStats) {
        let Some(key) = file.storage_key() else {
            return;
        };

        if let Err(e) = self.storage.delete(key).await {
            stats.storage_errors += 1;
            self.metrics
                .record_file_deletion(DeletionOutcome::StorageError);
            tracing::error!(
                error = %e,
                storage_key = %key,
                "Failed to delete file from storage, continuing with database deletion"
            );
        }
    }
}
