//! Failure classification
//!
//! Decides whether a failed job may be retried. Errors produced inside Depot
//! carry an [`ErrorKind`] tag and are classified by it. Errors from known
//! foreign crates are classified by type. Anything else falls through to a
//! substring match on the rendered message.
//!
//! The substring match is a weak point: it only exists for messages coming
//! out of dependencies we do not control, and it breaks silently when those
//! messages change. Prefer tagging the error at the point of failure.

use depot_core::{ErrorKind, JobError};
use depot_db::DbError;
use depot_storage::StorageError;

use crate::handlers::transform::TransformError;

/// Broker-facing verdict for a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Permanent,
    Transient,
}

/// Message fragments of uncontrolled errors that indicate a retry may help.
/// Checked before the permanent markers.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "timed out",
    "timeout",
    "deadline exceeded",
    "temporarily unavailable",
    "too many connections",
];

/// Message fragments of uncontrolled errors that no retry can fix
const PERMANENT_MARKERS: &[&str] = &[
    "corrupt",
    "unsupported",
    "malformed",
    "invalid image",
    "invalid dimensions",
    "unrecognized format",
];

/// True when retrying the job cannot succeed
pub fn is_permanent(err: &anyhow::Error) -> bool {
    classify(err) == Classification::Permanent
}

pub fn classify(err: &anyhow::Error) -> Classification {
    if let Some(permanent) = classify_chain(err) {
        return verdict(permanent);
    }

    let message = format!("{:#}", err).to_lowercase();
    if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
        return Classification::Transient;
    }
    if PERMANENT_MARKERS.iter().any(|m| message.contains(m)) {
        tracing::debug!(error = %message, "Classified untagged error as permanent by message");
        return Classification::Permanent;
    }

    Classification::Transient
}

fn verdict(permanent: bool) -> Classification {
    if permanent {
        Classification::Permanent
    } else {
        Classification::Transient
    }
}

/// Walk the cause chain for a tagged or typed error
fn classify_chain(err: &anyhow::Error) -> Option<bool> {
    for cause in err.chain() {
        if let Some(job_err) = cause.downcast_ref::<JobError>() {
            // Internal is the untagged default; the wrapped error follows
            // in the chain
            if job_err.kind() != ErrorKind::Internal {
                return Some(job_err.is_permanent());
            }
            continue;
        }

        if let Some(e) = cause.downcast_ref::<TransformError>() {
            return Some(e.is_permanent());
        }

        if let Some(e) = cause.downcast_ref::<StorageError>() {
            return Some(matches!(e, StorageError::InvalidKey(_)));
        }

        if cause.downcast_ref::<DbError>().is_some() {
            return Some(false);
        }

        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            // A request that cannot even be built (bad URL) never will be
            return Some(e.is_builder());
        }

        if let Some(e) = cause.downcast_ref::<serde_json::Error>() {
            return Some(!e.is_io());
        }

        if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return Some(false);
        }

        if let Some(e) = cause.downcast_ref::<std::io::Error>() {
            return Some(matches!(
                e.kind(),
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput
            ));
        }
    }

    None
}
