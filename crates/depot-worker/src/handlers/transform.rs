//! `file.transform` jobs: render a resized derivative of an uploaded image
//!
//! Codec work is delegated to a [`MediaTransformer`]; this handler owns the
//! validation, the file status transitions and the storage round trip.

use async_trait::async_trait;
use bytes::Bytes;
use depot_core::models::{File, FileStatus, Job, TransformPayload, JOB_KIND_FILE_TRANSFORM};
use depot_core::JobError;
use depot_db::FileRepository;
use depot_storage::keys::derivative_key;
use depot_storage::Storage;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::handler::JobHandler;

/// Source content types the transform pipeline accepts
const SUPPORTED_SOURCE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
];

/// Output format of a derivative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
}

impl OutputFormat {
    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "avif" => Ok(OutputFormat::Avif),
            _ => Err(JobError::unsupported_content_type(s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors reported by a [`MediaTransformer`]
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Corrupted source: {0}")]
    Corrupted(String),

    #[error("Unsupported source format: {0}")]
    Unsupported(String),

    #[error("Transform failed: {0}")]
    Failed(String),
}

impl TransformError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransformError::Corrupted(_) | TransformError::Unsupported(_))
    }
}

impl From<TransformError> for JobError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Corrupted(_) => JobError::corrupted_source(err),
            TransformError::Unsupported(_) => {
                JobError::new(depot_core::ErrorKind::UnsupportedContentType, err)
            }
            TransformError::Failed(_) => JobError::internal(err),
        }
    }
}

/// Image codec boundary
#[async_trait]
pub trait MediaTransformer: Send + Sync {
    /// Resize `source` to exactly `width`x`height` and encode it as `format`
    async fn transform(
        &self,
        source: Bytes,
        content_type: &str,
        width: u32,
        height: u32,
        format: OutputFormat,
    ) -> Result<Bytes, TransformError>;
}

/// Validated `file.transform` request
#[derive(Debug, Clone)]
struct TransformRequest {
    file_id: uuid::Uuid,
    width: u32,
    height: u32,
    format: OutputFormat,
}

impl TryFrom<TransformPayload> for TransformRequest {
    type Error = JobError;

    fn try_from(payload: TransformPayload) -> Result<Self, Self::Error> {
        if payload.file_id.is_nil() {
            return Err(JobError::missing_identifier("file_id"));
        }
        if payload.width <= 0 || payload.height <= 0 {
            return Err(JobError::invalid_dimensions(payload.width, payload.height));
        }
        Ok(Self {
            file_id: payload.file_id,
            width: payload.width as u32,
            height: payload.height as u32,
            format: payload.format.parse()?,
        })
    }
}

/// Handler for `file.transform` jobs
pub struct TransformHandler {
    file_repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    transformer: Arc<dyn MediaTransformer>,
}

impl TransformHandler {
    pub fn new(
        file_repository: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        transformer: Arc<dyn MediaTransformer>,
    ) -> Self {
        Self {
            file_repository,
            storage,
            transformer,
        }
    }

    /// Download, transform and upload. Returns the derivative key.
    async fn render(&self, file: &File, request: &TransformRequest) -> Result<String, JobError> {
        let source_key = file
            .storage_key()
            .ok_or_else(|| JobError::missing_identifier("storage_key"))?;

        let object = self.storage.download(source_key).await?;
        let content_type = object
            .content_type
            .clone()
            .unwrap_or_else(|| file.content_type.clone());
        if !SUPPORTED_SOURCE_TYPES.contains(&content_type.as_str()) {
            return Err(JobError::unsupported_content_type(&content_type));
        }
        let source = object.bytes().await?;

        let output = self
            .transformer
            .transform(
                source,
                &content_type,
                request.width,
                request.height,
                request.format,
            )
            .await?;

        let key = derivative_key(
            source_key,
            request.width as i32,
            request.height as i32,
            request.format.extension(),
        );
        let length = output.len() as u64;
        self.storage
            .upload(
                &key,
                Box::pin(std::io::Cursor::new(output)),
                request.format.to_mime_type(),
                Some(length),
            )
            .await?;

        Ok(key)
    }

    async fn set_status(&self, file_id: uuid::Uuid, status: FileStatus) -> Result<(), JobError> {
        self.file_repository.update_status(file_id, status).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for TransformHandler {
    fn kind(&self) -> &'static str {
        JOB_KIND_FILE_TRANSFORM
    }

    #[tracing::instrument(skip(self, cancel, job), fields(job.id = %job.id))]
    async fn handle(&self, cancel: &CancellationToken, job: &Job) -> Result<(), JobError> {
        let request = TransformRequest::try_from(job.decode::<TransformPayload>()?)?;

        let file = self
            .file_repository
            .get_file(request.file_id)
            .await?
            .ok_or_else(|| JobError::not_found("File", request.file_id))?;

        if file.is_soft_deleted() {
            tracing::info!(file_id = %file.id, "File was deleted, skipping transform");
            return Ok(());
        }

        self.set_status(file.id, FileStatus::Processing).await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobError::cancelled()),
            result = self.render(&file, &request) => result,
        };

        match result {
            Ok(key) => {
                self.set_status(file.id, FileStatus::Completed).await?;
                tracing::info!(
                    file_id = %file.id,
                    derivative_key = %key,
                    width = request.width,
                    height = request.height,
                    format = %request.format,
                    "Derivative rendered"
                );
                Ok(())
            }
            Err(e) => {
                if e.is_permanent() {
                    if let Err(status_err) = self.set_status(file.id, FileStatus::Failed).await {
                        tracing::error!(
                            error = %status_err,
                            file_id = %file.id,
                            "Failed to mark file as failed"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::ErrorKind;
    use uuid::Uuid;

    fn payload(file_id: Uuid, width: i32, height: i32, format: &str) -> TransformPayload {
        TransformPayload {
            file_id,
            width,
            height,
            format: format.to_string(),
        }
    }

    #[test]
    fn test_request_validation() {
        let id = Uuid::new_v4();

        let err = TransformRequest::try_from(payload(Uuid::nil(), 10, 10, "png")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingIdentifier);

        let err = TransformRequest::try_from(payload(id, 0, 10, "png")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions);

        let err = TransformRequest::try_from(payload(id, 10, -3, "png")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions);

        let err = TransformRequest::try_from(payload(id, 10, 10, "tiff")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedContentType);

        let request = TransformRequest::try_from(payload(id, 320, 240, "WEBP")).unwrap();
        assert_eq!(request.format, OutputFormat::WebP);
        assert_eq!((request.width, request.height), (320, 240));
    }

    #[test]
    fn test_transform_error_tags() {
        let err: JobError = TransformError::Corrupted("bad huffman table".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::CorruptedSource);
        let err: JobError = TransformError::Unsupported("image/x-icon".to_string()).into();
        assert!(err.is_permanent());
        let err: JobError = TransformError::Failed("out of memory".to_string()).into();
        assert!(!err.is_permanent());
    }
}
