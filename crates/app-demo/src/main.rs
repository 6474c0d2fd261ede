//! # App Demo
//!
//! Runs a small HTTP subsystem and the Prometheus metrics server under the
//! app runner.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (`tracing` subscriber, optional OTLP export)
//! 2. Load [`DemoConf`] from the environment
//! 3. Build the runner: collectors registered, capabilities injected
//! 4. Run until Ctrl+C or the first subsystem failure
//!
//! ```text
//! curl 'http://localhost:9933/?name=rust'   → main-handler: rust
//! curl 'http://localhost:9100/metrics'      → demo_simple_app_requests_total 1
//! ```

mod config;
mod simple_app;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use app_runner::{AppContext, AppRunner, MetricsServerApp, RunnerOptions};
use app_telemetry::{init_telemetry, namespaced_registry, TelemetryConfig, TracingLogger};
use opentelemetry::global;
use tracing::{error, info};

use crate::config::DemoConf;
use crate::simple_app::SimpleApp;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let telemetry_guard = init_telemetry(&telemetry)
        .await
        .context("failed to initialize telemetry")?;
    if !telemetry_guard.is_exporting() {
        info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, spans are not exported");
    }

    let conf = DemoConf::from_env();
    info!(
        env = %conf.env_name,
        log_level = %conf.log_level,
        http_port = conf.http_port,
        metrics_port = conf.metrics_port,
        "Loaded configuration"
    );

    let simple_app = SimpleApp::new(SocketAddr::from(([0, 0, 0, 0], conf.http_port)))
        .context("failed to create simple app")?;
    let metrics_app = MetricsServerApp::with_registry(
        SocketAddr::from(([0, 0, 0, 0], conf.metrics_port)),
        namespaced_registry("demo"),
    );

    let runner = AppRunner::new(
        simple_app,
        conf,
        RunnerOptions::from_env()
            .with_metrics_app(metrics_app)
            .with_logger(TracingLogger::shared("apprunner"))
            .with_tracer_provider(global::tracer_provider()),
    )
    .context("error creating apprunner")?;

    let (ctx, cancel) = AppContext::background().with_cancel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    info!(
        apps = ?runner.app_names(),
        exit_wait = ?runner.exit_wait(),
        "Starting app"
    );
    runner.run(ctx).await.context("error running apprunner")?;

    info!("Shutdown complete");
    Ok(())
}
