//! Runner configuration builder.
//!
//! [`RunnerOptions`] starts from defaults and applies [`RunnerOption`]
//! overrides in order; a later override of the same field wins. `build`
//! validates the result into an immutable [`RunnerConfig`].

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use app_telemetry::{noop_logger, SharedLogger};
use opentelemetry::global::{self, ObjectSafeTracerProvider};

use crate::error::RunnerError;
use crate::metrics_server::MetricsServerApp;
use crate::subsystem::{SharedTracerProvider, Subsystem};

/// Default upper bound on shutdown time.
pub const DEFAULT_EXIT_WAIT: Duration = Duration::from_secs(5);

/// Environment variable overriding the exit wait, in milliseconds.
pub const EXIT_WAIT_ENV: &str = "APP_EXIT_WAIT_MS";

/// One override of one configuration field.
pub enum RunnerOption<C> {
    MetricsApp(MetricsServerApp),
    Logger(SharedLogger),
    TracerProvider(SharedTracerProvider),
    AdditionalApps(Vec<Box<dyn Subsystem<C>>>),
    ExitWait(Duration),
}

/// Mutable builder for [`RunnerConfig`].
pub struct RunnerOptions<C> {
    metrics_app: Option<MetricsServerApp>,
    logger: SharedLogger,
    tracer_provider: SharedTracerProvider,
    additional_apps: Vec<Box<dyn Subsystem<C>>>,
    exit_wait: Duration,
}

impl<C> Default for RunnerOptions<C> {
    fn default() -> Self {
        Self {
            metrics_app: None,
            logger: noop_logger(),
            tracer_provider: Arc::new(global::tracer_provider()),
            additional_apps: Vec::new(),
            exit_wait: DEFAULT_EXIT_WAIT,
        }
    }
}

impl<C> RunnerOptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the exit wait taken from `APP_EXIT_WAIT_MS` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RunnerOptions::from_env`] with an injectable lookup.
    ///
    /// Unparsable values are ignored. `0` is kept and rejected by `build`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(ms) = lookup(EXIT_WAIT_ENV).and_then(|v| v.trim().parse::<u64>().ok()) {
            options.exit_wait = Duration::from_millis(ms);
        }
        options
    }

    /// Apply one override.
    pub fn apply(&mut self, option: RunnerOption<C>) {
        match option {
            RunnerOption::MetricsApp(app) => self.metrics_app = Some(app),
            RunnerOption::Logger(logger) => self.logger = logger,
            RunnerOption::TracerProvider(provider) => self.tracer_provider = provider,
            RunnerOption::AdditionalApps(apps) => self.additional_apps = apps,
            RunnerOption::ExitWait(exit_wait) => self.exit_wait = exit_wait,
        }
    }

    pub fn with_metrics_app(mut self, metrics_app: MetricsServerApp) -> Self {
        self.apply(RunnerOption::MetricsApp(metrics_app));
        self
    }

    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.apply(RunnerOption::Logger(logger));
        self
    }

    /// Tracer provider for the runner's spans and for `Traceable` subsystems.
    /// Defaults to the process-wide provider, a no-op until one is installed.
    pub fn with_tracer_provider<P>(mut self, provider: P) -> Self
    where
        P: ObjectSafeTracerProvider + Send + Sync + 'static,
    {
        self.apply(RunnerOption::TracerProvider(Arc::new(provider)));
        self
    }

    /// Replace the list of additional subsystems.
    pub fn with_additional_apps(mut self, apps: Vec<Box<dyn Subsystem<C>>>) -> Self {
        self.apply(RunnerOption::AdditionalApps(apps));
        self
    }

    pub fn with_exit_wait(mut self, exit_wait: Duration) -> Self {
        self.apply(RunnerOption::ExitWait(exit_wait));
        self
    }

    /// Freeze the options.
    pub fn build(self) -> Result<RunnerConfig<C>, RunnerError> {
        if self.exit_wait.is_zero() {
            return Err(RunnerError::InvalidExitWait(self.exit_wait));
        }
        Ok(RunnerConfig {
            metrics_app: self.metrics_app,
            logger: self.logger,
            tracer_provider: self.tracer_provider,
            additional_apps: self.additional_apps,
            exit_wait: self.exit_wait,
        })
    }
}

impl<C> Extend<RunnerOption<C>> for RunnerOptions<C> {
    fn extend<I: IntoIterator<Item = RunnerOption<C>>>(&mut self, iter: I) {
        for option in iter {
            self.apply(option);
        }
    }
}

impl<C> FromIterator<RunnerOption<C>> for RunnerOptions<C> {
    fn from_iter<I: IntoIterator<Item = RunnerOption<C>>>(iter: I) -> Self {
        let mut options = Self::default();
        options.extend(iter);
        options
    }
}

impl<C> fmt::Debug for RunnerOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerOptions")
            .field("metrics_app", &self.metrics_app.is_some())
            .field("additional_apps", &self.additional_apps.len())
            .field("exit_wait", &self.exit_wait)
            .finish_non_exhaustive()
    }
}

/// Validated, immutable runner configuration.
pub struct RunnerConfig<C> {
    pub(crate) metrics_app: Option<MetricsServerApp>,
    pub(crate) logger: SharedLogger,
    pub(crate) tracer_provider: SharedTracerProvider,
    pub(crate) additional_apps: Vec<Box<dyn Subsystem<C>>>,
    pub(crate) exit_wait: Duration,
}

impl<C> RunnerConfig<C> {
    pub fn exit_wait(&self) -> Duration {
        self.exit_wait
    }

    pub fn has_metrics_app(&self) -> bool {
        self.metrics_app.is_some()
    }

    pub fn additional_app_count(&self) -> usize {
        self.additional_apps.len()
    }
}
