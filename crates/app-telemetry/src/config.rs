//! Telemetry configuration from environment variables.

use std::env;

use tracing_subscriber::EnvFilter;

use crate::TelemetryError;

/// Configuration for logging and trace export.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for traces and logs
    pub service_name: String,

    /// OpenTelemetry OTLP endpoint; trace export is disabled when `None`
    pub otlp_endpoint: Option<String>,

    /// Log level filter (trace, debug, info, warn, error or a full directive)
    pub log_level: String,

    /// Whether to print events to stdout
    pub console_output: bool,

    /// Whether to format events as JSON
    pub json_logs: bool,

    /// Deployment environment (local, staging, production)
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "app-runner".to_string(),
            otlp_endpoint: None,
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            environment: "local".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: app-runner)
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: unset, export disabled)
    /// - `APP_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `APP_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `APP_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `APP_ENVIRONMENT`: Environment name (default: local)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),

            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),

            log_level: lookup("APP_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            console_output: lookup("APP_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),

            json_logs: lookup("APP_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            environment: lookup("APP_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check that the configuration can be turned into a subscriber.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::Config("service name is empty".to_string()));
        }
        EnvFilter::try_new(&self.log_level)
            .map_err(|e| TelemetryError::Config(format!("log level {:?}: {e}", self.log_level)))?;
        Ok(())
    }

    /// Whether spans should be exported over OTLP.
    pub fn tracing_enabled(&self) -> bool {
        self.otlp_endpoint.is_some()
    }
}
