//! Job execution error types
//!
//! Errors produced while handling a broker job carry an explicit [`ErrorKind`]
//! tag set at the point of failure. The tag decides whether the broker may
//! retry the job (transient) or must drop it (permanent); nothing downstream
//! needs to inspect the message text.

use chrono::{DateTime, Utc};
use std::fmt;

/// Failure category of a job error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Payload could not be decoded
    MalformedPayload,
    /// A required identifier was missing or nil
    MissingIdentifier,
    /// A required dimension was zero or negative
    InvalidDimensions,
    /// Content or output type the pipeline cannot handle
    UnsupportedContentType,
    /// Source bytes are unreadable by the decoder
    CorruptedSource,
    /// Webhook delivery ran out of attempts
    RetriesExhausted,
    /// Connection refused, reset, DNS failure and similar
    Network,
    /// Deadline exceeded
    Timeout,
    /// Entity missing, possibly because of replica lag
    NotFound,
    /// Database unavailable or query failed
    Database,
    /// Object store unavailable or request failed
    Storage,
    /// Caller cancelled the job mid-flight
    Cancelled,
    /// Anything else raised inside the core
    Internal,
}

impl ErrorKind {
    /// Permanent kinds describe conditions a retry cannot change.
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            ErrorKind::MalformedPayload
                | ErrorKind::MissingIdentifier
                | ErrorKind::InvalidDimensions
                | ErrorKind::UnsupportedContentType
                | ErrorKind::CorruptedSource
                | ErrorKind::RetriesExhausted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedPayload => "malformed_payload",
            ErrorKind::MissingIdentifier => "missing_identifier",
            ErrorKind::InvalidDimensions => "invalid_dimensions",
            ErrorKind::UnsupportedContentType => "unsupported_content_type",
            ErrorKind::CorruptedSource => "corrupted_source",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Database => "database",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution error tagged with its failure category
#[derive(Debug)]
pub struct JobError {
    kind: ErrorKind,
    inner: anyhow::Error,
    retry_at: Option<DateTime<Utc>>,
}

impl JobError {
    pub fn new(kind: ErrorKind, err: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            inner: err.into(),
            retry_at: None,
        }
    }

    pub fn malformed_payload(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::MalformedPayload, err)
    }

    pub fn missing_identifier(field: &str) -> Self {
        Self::new(
            ErrorKind::MissingIdentifier,
            anyhow::anyhow!("Required identifier '{}' is missing or nil", field),
        )
    }

    pub fn invalid_dimensions(width: i32, height: i32) -> Self {
        Self::new(
            ErrorKind::InvalidDimensions,
            anyhow::anyhow!("Dimensions must be positive, got {}x{}", width, height),
        )
    }

    pub fn unsupported_content_type(content_type: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedContentType,
            anyhow::anyhow!("Unsupported content type: {}", content_type),
        )
    }

    pub fn corrupted_source(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::CorruptedSource, err)
    }

    pub fn retries_exhausted(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::RetriesExhausted, err)
    }

    pub fn not_found(what: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::NotFound,
            anyhow::anyhow!("{} {} not found", what, id),
        )
    }

    pub fn database(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Database, err)
    }

    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Storage, err)
    }

    pub fn network(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Network, err)
    }

    pub fn timeout(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Timeout, err)
    }

    pub fn cancelled() -> Self {
        Self::new(
            ErrorKind::Cancelled,
            anyhow::anyhow!("Job cancelled before completion"),
        )
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Internal, err)
    }

    /// Attach the earliest time the broker should run the job again.
    pub fn with_retry_at(mut self, retry_at: DateTime<Utc>) -> Self {
        self.retry_at = Some(retry_at);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_permanent(&self) -> bool {
        self.kind.is_permanent()
    }

    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_at
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<anyhow::Error> for JobError {
    /// Untagged errors default to transient so the broker retries them
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

/// Extension trait for tagging a `Result` error with an [`ErrorKind`]
pub trait JobResultExt<T> {
    fn job_err(self, kind: ErrorKind) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn job_err(self, kind: ErrorKind) -> Result<T, JobError> {
        self.map_err(|e| JobError::new(kind, e))
    }
}
