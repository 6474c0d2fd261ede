//! Capability wiring.
//!
//! Turns the main subsystem plus a [`RunnerConfig`] into the frozen subsystem
//! list the runner drives:
//!
//! 1. `[main] + additional`
//! 2. collectors of every `MetricsExportable` subsystem registered with the
//!    metrics server (which is not yet in the list)
//! 3. metrics server appended last
//! 4. logger / shared config / tracer provider injected where supported
//!
//! All of it runs on exclusively owned boxes, before any subsystem starts.

use std::sync::Arc;

use app_telemetry::SharedLogger;
use tracing::debug;

use crate::error::RunnerError;
use crate::options::RunnerConfig;
use crate::subsystem::{SharedTracerProvider, Subsystem};

/// What the runner keeps after wiring.
pub(crate) struct Wired<C> {
    pub apps: Vec<Arc<dyn Subsystem<C>>>,
    pub logger: SharedLogger,
    pub tracer_provider: SharedTracerProvider,
}

pub(crate) fn wire<C: Send + Sync + 'static>(
    main_app: Box<dyn Subsystem<C>>,
    app_conf: Arc<C>,
    config: RunnerConfig<C>,
) -> Result<Wired<C>, RunnerError> {
    let RunnerConfig {
        metrics_app,
        logger,
        tracer_provider,
        additional_apps,
        exit_wait: _,
    } = config;

    let mut apps: Vec<Box<dyn Subsystem<C>>> = Vec::with_capacity(additional_apps.len() + 2);
    apps.push(main_app);
    apps.extend(additional_apps);

    if let Some(metrics_app) = metrics_app {
        for app in &apps {
            if let Some(exportable) = app.as_metrics_exportable() {
                metrics_app
                    .register_collectors(exportable.prometheus_collectors())
                    .map_err(RunnerError::CollectorRegistration)?;
            }
        }
        apps.push(Box::new(metrics_app));
    }

    for app in apps.iter_mut() {
        let name = app.name();
        if let Some(loggable) = app.as_loggable() {
            loggable.set_logger(Arc::clone(&logger));
            debug!(app = name, "injected logger");
        }
        if let Some(configurable) = app.as_config_settable() {
            configurable.set_app_conf(Arc::clone(&app_conf));
            debug!(app = name, "injected app config");
        }
        if let Some(traceable) = app.as_traceable() {
            traceable.set_tracer_provider(Arc::clone(&tracer_provider));
            debug!(app = name, "injected tracer provider");
        }
    }

    Ok(Wired {
        apps: apps.into_iter().map(Arc::from).collect(),
        logger,
        tracer_provider,
    })
}
