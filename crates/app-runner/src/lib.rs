//! # App Runner
//!
//! Runs a fixed set of long-lived subsystems concurrently and shuts them all
//! down together, within a bounded exit wait, when the caller cancels or the
//! first subsystem fails.
//!
//! ## Lifecycle
//!
//! ```text
//! AppRunner::new(main, conf, options)
//!     │  register Prometheus collectors (atomic: any conflict → nothing starts)
//!     │  inject logger / shared conf / tracer provider
//!     ↓
//! run(ctx) ── spawn run() of every subsystem ──→ wait
//!     │                                          │
//!     │       ctx done ──────────────────────────┤
//!     │       first non-context error ───────────┤
//!     ↓                                          ↓
//! stop_apps(ctx.without_cancel()) ── stop() of every subsystem, bounded by exit wait
//! ```
//!
//! ## Capabilities
//!
//! Subsystems opt into injection by overriding the query methods of
//! [`Subsystem`]; see the [`subsystem`] module.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use app_runner::{AppContext, AppRunner, MetricsServerApp, RunnerOptions};
//!
//! let runner = AppRunner::new(
//!     MyServer::default(),
//!     MyConf::from_env(),
//!     RunnerOptions::from_env()
//!         .with_metrics_app(MetricsServerApp::new(([0, 0, 0, 0], 9100).into()))
//!         .with_logger(app_telemetry::TracingLogger::shared("apprunner")),
//! )?;
//!
//! let (ctx, cancel) = AppContext::background().with_cancel();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     cancel.cancel();
//! });
//! runner.run(ctx).await?;
//! ```

pub mod context;
pub mod error;
pub mod metrics_server;
pub mod options;
pub mod runner;
pub mod subsystem;

mod wiring;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::AppContext;
pub use error::{ContextError, ErrorList, RunnerError, SubsystemError};
pub use metrics_server::{MetricsServerApp, ServerState};
pub use options::{RunnerConfig, RunnerOption, RunnerOptions, DEFAULT_EXIT_WAIT, EXIT_WAIT_ENV};
pub use runner::{AppRunner, RunState};
pub use subsystem::{
    named_tracer, ConfigSettable, Loggable, MetricsExportable, SharedTracerProvider, Subsystem,
    Traceable,
};
