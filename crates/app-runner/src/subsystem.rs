//! # Subsystem Contract
//!
//! Every unit the runner manages implements [`Subsystem`]. On top of `run`
//! and `stop`, a subsystem may opt into any of four capabilities by
//! overriding the matching query method:
//!
//! | Capability | Query | Injected / pulled |
//! |------------|-------|-------------------|
//! | [`Loggable`] | `as_loggable` | the runner's [`SharedLogger`] |
//! | [`ConfigSettable<C>`] | `as_config_settable` | the shared `Arc<C>` |
//! | [`Traceable`] | `as_traceable` | the tracer provider |
//! | [`MetricsExportable`] | `as_metrics_exportable` | Prometheus collectors |
//!
//! Queries default to `None`, so a subsystem that overrides nothing receives
//! nothing. Injection happens once, before any subsystem starts.

use std::sync::Arc;

use app_telemetry::SharedLogger;
use async_trait::async_trait;
use opentelemetry::global::{BoxedTracer, ObjectSafeTracerProvider};
use opentelemetry::InstrumentationLibrary;
use prometheus::core::Collector;

use crate::context::AppContext;
use crate::error::SubsystemError;

/// Tracer provider shared by the runner and every [`Traceable`] subsystem.
///
/// Any `opentelemetry::trace::TracerProvider` whose tracers and spans are
/// `Send + Sync` converts into it with `Arc::new`, the SDK provider and
/// `global::tracer_provider()` included.
pub type SharedTracerProvider = Arc<dyn ObjectSafeTracerProvider + Send + Sync>;

/// Tracer for instrumentation `name` from a shared provider.
pub fn named_tracer(provider: &SharedTracerProvider, name: &'static str) -> BoxedTracer {
    let library = InstrumentationLibrary::builder(name).build();
    BoxedTracer::new(provider.boxed_tracer(Arc::new(library)))
}

/// A long-lived unit of work managed by the runner.
///
/// `C` is the shared configuration type of one runner instance. Subsystems
/// that do not care about configuration implement `Subsystem<C>` for every
/// `C`.
#[async_trait]
pub trait Subsystem<C = ()>: Send + Sync + 'static {
    /// Name used in logs and error messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Run until stopped or failed.
    ///
    /// `Ok(())` means a clean stop, and so does `Err(SubsystemError::Context(_))`
    /// once `ctx` itself is done. A context error returned while `ctx` is
    /// still live is a failure like any other.
    async fn run(&self, ctx: AppContext) -> Result<(), SubsystemError>;

    /// Ask the subsystem to stop. Must be safe to call even if `run` never
    /// started, and should return promptly once `ctx` is done.
    async fn stop(&self, ctx: AppContext) -> Result<(), SubsystemError>;

    fn as_loggable(&mut self) -> Option<&mut dyn Loggable> {
        None
    }

    fn as_config_settable(&mut self) -> Option<&mut dyn ConfigSettable<C>> {
        None
    }

    fn as_traceable(&mut self) -> Option<&mut dyn Traceable> {
        None
    }

    fn as_metrics_exportable(&self) -> Option<&dyn MetricsExportable> {
        None
    }
}

/// Accepts the runner's logger.
pub trait Loggable {
    fn set_logger(&mut self, logger: SharedLogger);
}

/// Accepts the configuration shared by every subsystem of one runner.
pub trait ConfigSettable<C> {
    fn set_app_conf(&mut self, conf: Arc<C>);
}

/// Accepts the tracer provider.
pub trait Traceable {
    fn set_tracer_provider(&mut self, provider: SharedTracerProvider);
}

/// Exposes Prometheus collectors to register with the metrics subsystem.
pub trait MetricsExportable {
    /// Called once, during runner construction.
    fn prometheus_collectors(&self) -> Vec<Box<dyn Collector>>;
}
