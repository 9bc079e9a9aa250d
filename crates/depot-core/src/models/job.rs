use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job_error::JobError;

/// Job kind for webhook delivery attempts
pub const JOB_KIND_WEBHOOK_DELIVER: &str = "webhook.deliver";
/// Job kind for post-upload file transforms
pub const JOB_KIND_FILE_TRANSFORM: &str = "file.transform";

/// Envelope handed over by the broker for each dequeued job.
///
/// The core only looks at the kind tag and the decoded payload; queue
/// internals (leases, visibility, storage) stay on the broker side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub payload: Vec<u8>,
    /// Broker-side attempt counter, informational only
    #[serde(default)]
    pub attempt: u32,
}

impl Job {
    pub fn new(kind: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            attempt: 0,
        }
    }

    /// Build a job from a serializable payload.
    pub fn with_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> anyhow::Result<Self> {
        Ok(Self::new(kind, serde_json::to_vec(payload)?))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Decode the payload. A payload that does not parse can never succeed,
    /// so the error is tagged as permanent.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            JobError::malformed_payload(anyhow::anyhow!(
                "Failed to decode {} payload: {}",
                self.kind,
                e
            ))
        })
    }
}

/// Payload of a `webhook.deliver` job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryPayload {
    pub delivery_id: Uuid,
}

/// Payload of a `file.transform` job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformPayload {
    pub file_id: Uuid,
    pub width: i32,
    pub height: i32,
    /// Output format, e.g. `webp`
    pub format: String,
}
