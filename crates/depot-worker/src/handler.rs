//! Job handler trait
//!
//! Each job kind has one handler. The dispatcher owns the registry and calls
//! `handle` for every job whose kind matches.

use async_trait::async_trait;
use depot_core::models::Job;
use depot_core::JobError;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Kind tag this handler serves, e.g. `webhook.deliver`
    fn kind(&self) -> &'static str;

    /// Process one job.
    ///
    /// Errors must be tagged: a permanent [`JobError`] tells the broker never
    /// to run the job again.
    async fn handle(&self, cancel: &CancellationToken, job: &Job) -> Result<(), JobError>;
}
