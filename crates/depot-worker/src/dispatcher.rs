//! Job dispatch: handler registry, timeout and outcome mapping

use chrono::{DateTime, Utc};
use depot_core::models::Job;
use depot_core::JobError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::classify::is_permanent;
use crate::handler::JobHandler;

/// What the broker should do with a job after dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Acknowledge and remove the job
    Completed,
    /// Keep the job; run it again no earlier than `retry_at` when given
    Retry { retry_at: Option<DateTime<Utc>> },
    /// Drop the job, it can never succeed
    Discard,
}

pub struct JobDispatcher {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    job_timeout: Duration,
}

impl JobDispatcher {
    pub fn new(job_timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            job_timeout,
        }
    }

    /// Register a handler for its kind, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            tracing::warn!(job_kind = kind, "Replaced existing job handler");
        }
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Run `job` through its handler and map the result for the broker.
    #[tracing::instrument(
        skip(self, cancel, job),
        fields(job.id = %job.id, job.kind = %job.kind, job.attempt = job.attempt)
    )]
    pub async fn dispatch(&self, cancel: &CancellationToken, job: &Job) -> JobOutcome {
        let Some(handler) = self.handlers.get(job.kind()) else {
            tracing::error!("No handler registered for job kind, discarding");
            return JobOutcome::Discard;
        };

        let start = Instant::now();
        let result = match tokio::time::timeout(self.job_timeout, handler.handle(cancel, job)).await
        {
            Ok(result) => result,
            Err(elapsed) => Err(JobError::timeout(elapsed)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::info!(duration_ms, "Job completed successfully");
                JobOutcome::Completed
            }
            Err(err) => Self::outcome_for(err, duration_ms),
        }
    }

    fn outcome_for(err: JobError, duration_ms: u64) -> JobOutcome {
        let kind = err.kind();
        let retry_at = err.retry_at();
        let err = anyhow::Error::from(err);

        if is_permanent(&err) {
            tracing::error!(
                error = %err,
                error.kind = %kind,
                duration_ms,
                "Job failed permanently, will not retry"
            );
            JobOutcome::Discard
        } else {
            tracing::warn!(
                error = %err,
                error.kind = %kind,
                retry_at = ?retry_at,
                duration_ms,
                "Job failed, returning to broker for retry"
            );
            JobOutcome::Retry { retry_at }
        }
    }
}
