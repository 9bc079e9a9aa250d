use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Processing lifecycle of an uploaded file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Completed => write!(f, "completed"),
            FileStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// Stored file record
///
/// `deleted_at` is the soft-delete marker: a file carrying it is hidden from
/// normal listings but still addressable by the cleanup sweeper until its row
/// is purged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct File {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub storage_key: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: FileStatus,
    pub deleted_at: Option<DateTime<Utc>>,
    pub retention_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl File {
    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True when the retention deadline has passed at `now`.
    pub fn retention_expired(&self, now: DateTime<Utc>) -> bool {
        self.retention_until.is_some_and(|until| until < now)
    }

    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }
}
