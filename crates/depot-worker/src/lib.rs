//! Depot Worker
//!
//! Broker-facing side of the processing core. The broker hands every dequeued
//! [`Job`] to [`JobDispatcher::dispatch`], which routes it to the registered
//! [`JobHandler`] for its kind, bounds it with a timeout and tells the broker
//! whether to acknowledge, retry or discard it.
//!
//! Shutdown: cancel the token passed to `dispatch` to abort in-flight network
//! calls; handlers return a transient `Cancelled` error and the broker keeps
//! the job.

pub mod classify;
pub mod dispatcher;
pub mod handler;
pub mod handlers;
pub mod runtime;

pub use classify::{classify, is_permanent, Classification};
pub use depot_core::models::Job;
pub use dispatcher::{JobDispatcher, JobOutcome};
pub use handler::JobHandler;
pub use handlers::transform::{MediaTransformer, OutputFormat, TransformError, TransformHandler};
pub use handlers::webhook::WebhookDeliveryHandler;
pub use runtime::WorkerRuntime;
