//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use depot_core::JobError;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Upper bound on buffer pre-allocation from a declared length
pub(crate) const MAX_PREALLOC_BYTES: u64 = 64 * 1024;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Reader handed to [`Storage::upload`]
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Chunked object body returned by [`Storage::download`]
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// A downloaded object
pub struct StorageObject {
    pub content_type: Option<String>,
    pub content_length: u64,
    pub body: ByteStream,
}

impl StorageObject {
    /// Drain the body into a single buffer.
    pub async fn bytes(mut self) -> StorageResult<Bytes> {
        let capacity = self.content_length.min(MAX_PREALLOC_BYTES) as usize;
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for StorageObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageObject")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Storage abstraction trait
///
/// Handlers and the sweeper only ever see `Arc<dyn Storage>`, so the S3 and
/// in-memory backends are interchangeable.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the reader's bytes under `key`, replacing any existing object.
    ///
    /// When `content_length` is given and the reader yields a different number
    /// of bytes, the upload fails with `UploadFailed` and nothing is committed.
    async fn upload(
        &self,
        key: &str,
        reader: ByteReader,
        content_type: &str,
        content_length: Option<u64>,
    ) -> StorageResult<()>;

    /// Open an object for reading. Returns `NotFound` if the key is absent.
    async fn download(&self, key: &str) -> StorageResult<StorageObject>;

    /// Delete an object. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Generate a time-limited GET URL for an existing object.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => JobError::new(depot_core::ErrorKind::NotFound, err),
            StorageError::InvalidKey(_) => JobError::malformed_payload(err),
            other => JobError::storage(other),
        }
    }
}
