//! Depot Infrastructure Library
//!
//! This crate provides shared infrastructure for the worker:
//! - Telemetry initialization (tracing subscriber)
//! - Metrics recording
//! - Webhook signing, backoff and delivery

#[cfg(any(feature = "observability-basic", feature = "observability-opentelemetry"))]
pub mod telemetry;

pub mod metrics;

#[cfg(feature = "webhook")]
pub mod webhook;

// Re-export commonly used types
#[cfg(any(feature = "observability-basic", feature = "observability-opentelemetry"))]
pub use telemetry::init_telemetry;

pub use metrics::{
    DeletionOutcome, DeliveryOutcome, InMemoryMetrics, MetricsRecorder, TracingMetrics,
};

#[cfg(feature = "observability-opentelemetry")]
pub use metrics::OtelMetrics;

#[cfg(feature = "webhook")]
pub use webhook::{
    Backoff, DeliveryReport, FixedJitter, JitterSource, ThreadRngJitter, WebhookDeliveryEngine,
};
