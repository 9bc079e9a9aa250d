//! Configuration module
//!
//! Worker configuration is read from environment variables (with `.env`
//! support) and grouped per component: webhook delivery, retention cleanup,
//! object storage and the job runtime.

use std::env;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const WEBHOOK_TIMEOUT_SECS: u64 = 30;
const WEBHOOK_MAX_RETRIES: i32 = 10;
const WEBHOOK_MAX_RESPONSE_BYTES: usize = 1024;
const CLEANUP_BATCH_SIZE: i64 = 100;
const CLEANUP_GRACE_PERIOD_HOURS: i64 = 168;
const CLEANUP_INTERVAL_SECS: u64 = 3600;
const JOB_TIMEOUT_SECS: u64 = 300;
const MAX_CONNECTIONS: u32 = 20;
const MEMORY_STORAGE_BASE_URL: &str = "memory://depot";

/// Outbound webhook delivery settings
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub timeout: Duration,
    /// Attempt count at which a delivery is escalated to the dead-letter queue
    pub max_retries: i32,
    /// Response body bytes kept for diagnostics
    pub max_response_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(WEBHOOK_TIMEOUT_SECS),
            max_retries: WEBHOOK_MAX_RETRIES,
            max_response_bytes: WEBHOOK_MAX_RESPONSE_BYTES,
        }
    }
}

/// Retention sweeper settings
#[derive(Clone, Debug)]
pub struct CleanupConfig {
    pub batch_size: i64,
    /// How long a soft-deleted file is kept before it is purged
    pub grace_period: chrono::Duration,
    pub interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: CLEANUP_BATCH_SIZE,
            grace_period: chrono::Duration::hours(CLEANUP_GRACE_PERIOD_HOURS),
            interval: Duration::from_secs(CLEANUP_INTERVAL_SECS),
        }
    }
}

/// Object storage settings
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub s3_endpoint: Option<String>,
    /// Base URL used by the in-memory backend when presigning
    pub memory_base_url: String,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            memory_base_url: MEMORY_STORAGE_BASE_URL.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }
        Ok(())
    }
}

/// Worker process configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub job_timeout: Duration,
    pub webhook: WebhookConfig,
    pub cleanup: CleanupConfig,
    pub storage: StorageConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let webhook = WebhookConfig {
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "WEBHOOK_TIMEOUT_SECONDS",
                WEBHOOK_TIMEOUT_SECS,
            )),
            max_retries: parse_or(&lookup, "WEBHOOK_MAX_RETRIES", WEBHOOK_MAX_RETRIES),
            max_response_bytes: parse_or(
                &lookup,
                "WEBHOOK_MAX_RESPONSE_BYTES",
                WEBHOOK_MAX_RESPONSE_BYTES,
            ),
        };

        let grace_period_hours: i64 = parse_or(
            &lookup,
            "CLEANUP_GRACE_PERIOD_HOURS",
            CLEANUP_GRACE_PERIOD_HOURS,
        );
        let grace_period = chrono::Duration::try_hours(grace_period_hours).ok_or_else(|| {
            anyhow::anyhow!(
                "CLEANUP_GRACE_PERIOD_HOURS is out of range: {}",
                grace_period_hours
            )
        })?;

        let cleanup = CleanupConfig {
            batch_size: parse_or(&lookup, "CLEANUP_BATCH_SIZE", CLEANUP_BATCH_SIZE),
            grace_period,
            interval: Duration::from_secs(parse_or(
                &lookup,
                "CLEANUP_INTERVAL_SECONDS",
                CLEANUP_INTERVAL_SECS,
            )),
        };

        let storage = StorageConfig {
            backend: storage_backend,
            s3_bucket: lookup("S3_BUCKET"),
            s3_region: lookup("S3_REGION").or_else(|| lookup("AWS_REGION")),
            s3_endpoint: lookup("S3_ENDPOINT"),
            memory_base_url: lookup("MEMORY_STORAGE_BASE_URL")
                .unwrap_or_else(|| MEMORY_STORAGE_BASE_URL.to_string()),
        };

        let config = Self {
            database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            job_timeout: Duration::from_secs(parse_or(
                &lookup,
                "JOB_TIMEOUT_SECONDS",
                JOB_TIMEOUT_SECS,
            )),
            webhook,
            cleanup,
            storage,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.webhook.max_retries < 1 {
            return Err(anyhow::anyhow!("WEBHOOK_MAX_RETRIES must be at least 1"));
        }

        if self.cleanup.batch_size < 1 {
            return Err(anyhow::anyhow!("CLEANUP_BATCH_SIZE must be at least 1"));
        }

        if self.cleanup.grace_period < chrono::Duration::zero() {
            return Err(anyhow::anyhow!(
                "CLEANUP_GRACE_PERIOD_HOURS must not be negative"
            ));
        }

        self.storage.validate()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
