//! Postgres repositories and connection setup

pub mod file;
pub mod webhook;

pub use file::PgFileRepository;
pub use webhook::PgWebhookRepository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::error::DbResult;

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Database connected successfully");
    Ok(pool)
}

/// Apply pending migrations bundled with this crate
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
