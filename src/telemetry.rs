use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging per the observability settings; a
/// RUST_LOG override takes precedence over the configured level.
/// Correlation IDs and span attributes give downstream log consumers the
/// per-request trail they need; no exporter backend is wired in here.
pub fn init_telemetry(observability: &ObservabilityConfig) -> Result<()> {
    let filter = log_filter(
        &observability.log_level,
        std::env::var("RUST_LOG").ok().as_deref(),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("medi-coordinator telemetry initialized with structured logging");
    Ok(())
}

fn log_filter(configured_level: &str, env_override: Option<&str>) -> EnvFilter {
    match env_override {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(configured_level),
    }
}

/// Generate a correlation ID for linking one request's operations.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span carrying the common coordination attributes for one request.
pub fn create_coordination_span(
    operation: &str,
    request_id: &str,
    case_id: &str,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "coordination",
        operation = operation,
        request.id = request_id,
        case.id = case_id,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}
