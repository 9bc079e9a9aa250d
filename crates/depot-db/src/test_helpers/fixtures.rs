//! Test fixtures and helper functions for creating test data

use chrono::{DateTime, Utc};
use depot_core::models::{
    DeliveryStatus, File, FileStatus, Webhook, WebhookDelivery, WebhookEventType,
};
use uuid::Uuid;

/// Create a live, completed test file stored under `media/{tenant}/{id}.png`
pub fn create_test_file(tenant_id: Uuid) -> File {
    let id = Uuid::new_v4();
    let now = Utc::now();
    File {
        id,
        tenant_id,
        user_id: Uuid::new_v4(),
        storage_key: Some(format!("media/{}/{}.png", tenant_id, id)),
        content_type: "image/png".to_string(),
        size_bytes: 512 * 1024,
        status: FileStatus::Completed,
        deleted_at: None,
        retention_until: None,
        created_at: now,
        updated_at: now,
    }
}

/// Create a test file soft-deleted at `deleted_at`
pub fn create_soft_deleted_file(tenant_id: Uuid, deleted_at: DateTime<Utc>) -> File {
    File {
        deleted_at: Some(deleted_at),
        ..create_test_file(tenant_id)
    }
}

/// Create a live test file whose retention ends at `retention_until`
pub fn create_retained_file(tenant_id: Uuid, retention_until: DateTime<Utc>) -> File {
    File {
        retention_until: Some(retention_until),
        ..create_test_file(tenant_id)
    }
}

pub fn create_test_webhook(url: &str, signing_secret: &str) -> Webhook {
    Webhook {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        url: url.to_string(),
        signing_secret: signing_secret.to_string(),
        created_at: Utc::now(),
    }
}

/// Create a pending delivery that has already been attempted `attempts` times
pub fn create_pending_delivery(webhook_id: Uuid, attempts: i32) -> WebhookDelivery {
    let now = Utc::now();
    WebhookDelivery {
        id: Uuid::new_v4(),
        webhook_id,
        event_type: WebhookEventType::FileUploaded,
        payload: br#"{"event":"file.uploaded","file_id":"00000000-0000-0000-0000-000000000001"}"#
            .to_vec(),
        attempts,
        last_response_code: None,
        last_response_body: None,
        next_retry_at: None,
        status: DeliveryStatus::Pending,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}
