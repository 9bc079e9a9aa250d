//! Tracing subscriber initialization
//!
//! Log level comes from `RUST_LOG`; `LOG_FORMAT=json` switches the fmt layer
//! to JSON lines.

use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,depot=debug";

/// Initialize the global tracing subscriber
pub fn init_telemetry(service_name: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()));

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    #[cfg(feature = "observability-opentelemetry")]
    tracing::info!(
        service = %service_name,
        "Tracing initialized, metrics exported through the global OpenTelemetry meter"
    );

    #[cfg(not(feature = "observability-opentelemetry"))]
    tracing::info!(
        service = %service_name,
        "Tracing initialized (OpenTelemetry feature not enabled)"
    );

    Ok(())
}
