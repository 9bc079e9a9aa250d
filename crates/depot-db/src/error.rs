use depot_core::JobError;
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

/// Result type for repository operations
pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for JobError {
    /// Any database failure is an outage from the job's point of view.
    fn from(err: DbError) -> Self {
        JobError::database(err)
    }
}
