//! Delivery and cleanup metrics
//!
//! Recording is fire-and-forget: a recorder never fails the operation it
//! observes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

#[cfg(feature = "observability-opentelemetry")]
use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

/// Outcome of one webhook delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    Success,
    Retry,
    Failed,
    Dlq,
    DlqWriteFailed,
}

impl DeliveryOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Retry => "retry",
            DeliveryOutcome::Failed => "failed",
            DeliveryOutcome::Dlq => "dlq",
            DeliveryOutcome::DlqWriteFailed => "dlq_write_failed",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one file removal by the cleanup sweeper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionOutcome {
    /// Soft-deleted row purged
    Purged,
    /// Retention-expired file soft-deleted
    Expired,
    StorageError,
    DatabaseError,
}

impl DeletionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionOutcome::Purged => "purged",
            DeletionOutcome::Expired => "expired",
            DeletionOutcome::StorageError => "storage_error",
            DeletionOutcome::DatabaseError => "database_error",
        }
    }
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics sink used by the delivery engine and the cleanup sweeper
pub trait MetricsRecorder: Send + Sync {
    fn record_delivery(&self, outcome: DeliveryOutcome, duration: Duration);

    fn record_file_deletion(&self, outcome: DeletionOutcome);
}

/// Emits metrics as structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricsRecorder for TracingMetrics {
    fn record_delivery(&self, outcome: DeliveryOutcome, duration: Duration) {
        tracing::debug!(
            metric = "webhook.delivery",
            outcome = %outcome,
            duration_ms = duration.as_secs_f64() * 1000.0
        );
    }

    fn record_file_deletion(&self, outcome: DeletionOutcome) {
        tracing::debug!(metric = "cleanup.file_deletion", outcome = %outcome);
    }
}

/// Counts recorded outcomes, for tests and health endpoints
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    deliveries: Mutex<HashMap<DeliveryOutcome, u64>>,
    deletions: Mutex<HashMap<DeletionOutcome, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivery_count(&self, outcome: DeliveryOutcome) -> u64 {
        self.deliveries
            .lock()
            .map(|m| m.get(&outcome).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn deletion_count(&self, outcome: DeletionOutcome) -> u64 {
        self.deletions
            .lock()
            .map(|m| m.get(&outcome).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn record_delivery(&self, outcome: DeliveryOutcome, _duration: Duration) {
        if let Ok(mut m) = self.deliveries.lock() {
            *m.entry(outcome).or_insert(0) += 1;
        }
    }

    fn record_file_deletion(&self, outcome: DeletionOutcome) {
        if let Ok(mut m) = self.deletions.lock() {
            *m.entry(outcome).or_insert(0) += 1;
        }
    }
}

/// OpenTelemetry-backed recorder using the global meter provider
#[cfg(feature = "observability-opentelemetry")]
pub struct OtelMetrics {
    delivery_counter: Counter<u64>,
    delivery_duration: Histogram<f64>,
    deletion_counter: Counter<u64>,
}

#[cfg(feature = "observability-opentelemetry")]
impl OtelMetrics {
    pub fn new(meter: Meter) -> Self {
        let delivery_counter = meter
            .u64_counter("depot.webhook.deliveries.count")
            .with_description("Webhook delivery attempts by outcome")
            .build();

        let delivery_duration = meter
            .f64_histogram("depot.webhook.delivery.duration")
            .with_description("Webhook delivery duration in seconds")
            .with_unit("s")
            .build();

        let deletion_counter = meter
            .u64_counter("depot.cleanup.files.count")
            .with_description("Files processed by the cleanup sweeper by outcome")
            .build();

        Self {
            delivery_counter,
            delivery_duration,
            deletion_counter,
        }
    }

    pub fn global() -> Self {
        Self::new(opentelemetry::global::meter("depot"))
    }
}

#[cfg(feature = "observability-opentelemetry")]
impl MetricsRecorder for OtelMetrics {
    fn record_delivery(&self, outcome: DeliveryOutcome, duration: Duration) {
        let labels = &[KeyValue::new("outcome", outcome.as_str())];
        self.delivery_counter.add(1, labels);
        self.delivery_duration.record(duration.as_secs_f64(), labels);
    }

    fn record_file_deletion(&self, outcome: DeletionOutcome) {
        self.deletion_counter
            .add(1, &[KeyValue::new("outcome", outcome.as_str())]);
    }
}
