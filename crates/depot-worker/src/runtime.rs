//! Worker wiring
//!
//! Builds the repositories, storage backend, delivery engine and handlers
//! from a [`WorkerConfig`], and starts the periodic cleanup sweeper.

use anyhow::Context;
use depot_core::WorkerConfig;
use depot_db::{connect, run_migrations, FileRepository, PgFileRepository, PgWebhookRepository};
use depot_infra::{MetricsRecorder, WebhookDeliveryEngine};
use depot_services::{CleanupHandle, CleanupService};
use depot_storage::{create_storage, Storage};
use std::sync::Arc;

use crate::dispatcher::JobDispatcher;
use crate::handlers::transform::{MediaTransformer, TransformHandler};
use crate::handlers::webhook::WebhookDeliveryHandler;

pub struct WorkerRuntime {
    dispatcher: Arc<JobDispatcher>,
    cleanup: CleanupHandle,
}

impl WorkerRuntime {
    /// Connect to Postgres and object storage, register every handler and
    /// start the cleanup sweeper.
    pub async fn start(
        config: WorkerConfig,
        transformer: Arc<dyn MediaTransformer>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid worker configuration")?;

        let pool = connect(&config.database_url, config.db_max_connections)
            .await
            .context("Failed to connect to database")?;
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        let storage = create_storage(&config.storage).context("Failed to initialize storage")?;
        let file_repository: Arc<dyn FileRepository> =
            Arc::new(PgFileRepository::new(pool.clone()));
        let webhook_repository = Arc::new(PgWebhookRepository::new(pool));

        let engine =
            WebhookDeliveryEngine::new(webhook_repository, metrics.clone(), config.webhook.clone())?;
        let dispatcher = Self::build_dispatcher(
            &config,
            engine,
            file_repository.clone(),
            storage.clone(),
            transformer,
        );

        let cleanup = Arc::new(CleanupService::new(
            file_repository,
            storage,
            metrics,
            config.cleanup.clone(),
        ))
        .start();

        tracing::info!(job_kinds = ?dispatcher.kinds(), "Worker runtime started");

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            cleanup,
        })
    }

    /// Dispatcher with the `webhook.deliver` and `file.transform` handlers
    pub fn build_dispatcher(
        config: &WorkerConfig,
        engine: WebhookDeliveryEngine,
        file_repository: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        transformer: Arc<dyn MediaTransformer>,
    ) -> JobDispatcher {
        JobDispatcher::new(config.job_timeout)
            .with_handler(Arc::new(WebhookDeliveryHandler::new(engine)))
            .with_handler(Arc::new(TransformHandler::new(
                file_repository,
                storage,
                transformer,
            )))
    }

    /// Dispatcher to hand to the broker consumer
    pub fn dispatcher(&self) -> Arc<JobDispatcher> {
        self.dispatcher.clone()
    }

    /// Stop the cleanup sweeper. In-flight jobs are stopped by cancelling the
    /// token passed to `dispatch`.
    pub async fn shutdown(self) {
        self.cleanup.shutdown().await;
        tracing::info!("Worker runtime stopped");
    }
}
