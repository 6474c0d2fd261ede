//! # App Telemetry
//!
//! Observability plumbing shared by the app runner and the subsystems it
//! manages.
//!
//! ## Components
//!
//! - **Logging**: the [`Logger`] trait injected into subsystems, with a
//!   silent [`NoOpLogger`] and a [`TracingLogger`] backed by `tracing`
//! - **Tracing**: `tracing-subscriber` setup plus an optional OpenTelemetry
//!   OTLP pipeline installed as the global tracer provider
//! - **Metrics**: Prometheus text encoding for a collector registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use app_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(&config).await.expect("Failed to init telemetry");
//!
//!     // spans and events are now exported
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset | OTLP collector; tracing export is off when unset |
//! | `OTEL_SERVICE_NAME` | `app-runner` | Service name in traces |
//! | `APP_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `APP_CONSOLE_OUTPUT` | `true` | Print events to stdout |
//! | `APP_JSON_LOGS` | `false` | JSON formatted events |
//! | `APP_ENVIRONMENT` | `local` | Deployment environment attribute |

mod config;
mod logging;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use logging::{noop_logger, Logger, NoOpLogger, SharedLogger, TracingLogger};
pub use metrics::{encode_registry, namespaced_registry};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize OpenTelemetry tracer: {0}")]
    TracerInit(String),

    #[error("Failed to encode Prometheus metrics: {0}")]
    MetricsEncode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and, when an OTLP endpoint is configured, trace export.
///
/// Returns a guard that must be held for the lifetime of the application.
/// Dropping it flushes pending spans.
pub async fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    config.validate()?;

    let tracing_guard = tracing_setup::init_tracing(config).await?;

    Ok(TelemetryGuard {
        tracing: tracing_guard,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    tracing: TracingGuard,
}

impl TelemetryGuard {
    /// Whether spans are exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.tracing.is_exporting()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TelemetryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_name, "app-runner");
    }

    #[test]
    fn test_error_messages() {
        let err = TelemetryError::Config("bad level".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bad level");
    }
}
