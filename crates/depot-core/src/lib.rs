//! Depot Core Library
//!
//! This crate provides the domain models, tagged job errors and configuration
//! shared by the storage, database, delivery and cleanup crates.

pub mod config;
pub mod job_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{CleanupConfig, StorageConfig, WebhookConfig, WorkerConfig};
pub use job_error::{ErrorKind, JobError, JobResultExt};
pub use storage_types::StorageBackend;
