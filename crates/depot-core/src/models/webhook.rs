use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Webhook event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "webhook_event_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    FileUploaded,
    FileProcessed,
    FileProcessingFailed,
    FileDeleted,
    FileExpired,
}

impl Display for WebhookEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            WebhookEventType::FileUploaded => write!(f, "file.uploaded"),
            WebhookEventType::FileProcessed => write!(f, "file.processed"),
            WebhookEventType::FileProcessingFailed => write!(f, "file.processing_failed"),
            WebhookEventType::FileDeleted => write!(f, "file.deleted"),
            WebhookEventType::FileExpired => write!(f, "file.expired"),
        }
    }
}

impl FromStr for WebhookEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file.uploaded" => Ok(WebhookEventType::FileUploaded),
            "file.processed" => Ok(WebhookEventType::FileProcessed),
            "file.processing_failed" => Ok(WebhookEventType::FileProcessingFailed),
            "file.deleted" => Ok(WebhookEventType::FileDeleted),
            "file.expired" => Ok(WebhookEventType::FileExpired),
            _ => Err(anyhow::anyhow!("Invalid webhook event type: {}", s)),
        }
    }
}

/// Webhook delivery status
///
/// `Delivered` and `Failed` are terminal: a delivery in either state is never
/// mutated again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "webhook_delivery_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Webhook configuration entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Webhook {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    #[serde(skip_serializing)]
    pub signing_secret: String,
    pub created_at: DateTime<Utc>,
}

/// One event addressed to one webhook, with its delivery bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: WebhookEventType,
    /// Serialized event body, sent byte-for-byte on every attempt
    pub payload: Vec<u8>,
    pub attempts: i32,
    pub last_response_code: Option<i32>,
    pub last_response_body: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Dead-letter record for a delivery that exhausted its retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct WebhookDlqEntry {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub delivery_id: Uuid,
    pub event_type: WebhookEventType,
    pub payload: Vec<u8>,
    pub error_message: String,
    pub attempts: i32,
    pub last_response_code: Option<i32>,
    pub last_response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert model for [`WebhookDlqEntry`]
#[derive(Debug, Clone)]
pub struct NewDlqEntry {
    pub webhook_id: Uuid,
    pub delivery_id: Uuid,
    pub event_type: WebhookEventType,
    pub payload: Vec<u8>,
    pub error_message: String,
    pub attempts: i32,
    pub last_response_code: Option<i32>,
    pub last_response_body: Option<String>,
}

impl NewDlqEntry {
    /// Snapshot a delivery at the moment it is escalated.
    pub fn from_delivery(
        delivery: &WebhookDelivery,
        attempts: i32,
        response_code: i32,
        response_body: &str,
        error_message: String,
    ) -> Self {
        Self {
            webhook_id: delivery.webhook_id,
            delivery_id: delivery.id,
            event_type: delivery.event_type,
            payload: delivery.payload.clone(),
            error_message,
            attempts,
            last_response_code: Some(response_code),
            last_response_body: Some(response_body.to_string()),
        }
    }
}
