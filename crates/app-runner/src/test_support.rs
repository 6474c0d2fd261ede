//! Scriptable subsystem and recording logger used by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use app_telemetry::{Logger, SharedLogger};
use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::IntCounter;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::context::AppContext;
use crate::error::{ContextError, SubsystemError};
use crate::subsystem::{
    ConfigSettable, Loggable, MetricsExportable, SharedTracerProvider, Subsystem, Traceable,
};

#[derive(Debug, Default, Clone)]
pub struct TestConf {
    pub env_name: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Capabilities {
    pub logger: bool,
    pub config: bool,
    pub tracer: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            logger: true,
            config: true,
            tracer: true,
        }
    }

    pub fn logger_only() -> Self {
        Self {
            logger: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub enum RunBehavior {
    /// Block until the run context is done or `stop` is called.
    #[default]
    UntilStopped,
    FailAfter(Duration),
    /// Return `DeadlineExceeded` from an inner timeout while the run context
    /// stays live.
    InnerDeadline(Duration),
    /// Fail only once `stop` has been called.
    FailWhenStopped,
    Panic,
    ReturnImmediately,
}

#[derive(Debug, Default, Clone, Copy)]
pub enum StopBehavior {
    #[default]
    Prompt,
    Fail,
    /// Never returns, whatever the context says.
    Hang,
    /// Returns the context error once the stop context is done.
    UntilDone,
    /// Returns after `run` has returned.
    AwaitRun,
}

/// Logger that keeps every line for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }

    /// Whether some line at `level` contains every fragment.
    pub fn has(&self, level: Level, fragments: &[&str]) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, line)| *l == level && fragments.iter().all(|f| line.contains(f)))
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

struct SpyState {
    run_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    logger_injections: AtomicUsize,
    conf_injections: AtomicUsize,
    tracer_injections: AtomicUsize,
    conf_env_name: Mutex<Option<String>>,
    started: watch::Sender<bool>,
    run_returned: watch::Sender<bool>,
    stop_returned: watch::Sender<bool>,
}

/// Observation handle that stays usable after the spy moved into a runner.
#[derive(Clone)]
pub struct SpyHandle(Arc<SpyState>);

impl SpyHandle {
    fn new() -> Self {
        Self(Arc::new(SpyState {
            run_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            logger_injections: AtomicUsize::new(0),
            conf_injections: AtomicUsize::new(0),
            tracer_injections: AtomicUsize::new(0),
            conf_env_name: Mutex::new(None),
            started: watch::channel(false).0,
            run_returned: watch::channel(false).0,
            stop_returned: watch::channel(false).0,
        }))
    }

    pub fn run_calls(&self) -> usize {
        self.0.run_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.0.stop_calls.load(Ordering::SeqCst)
    }

    /// `(logger, config, tracer)` injection counts.
    pub fn injections(&self) -> (usize, usize, usize) {
        (
            self.0.logger_injections.load(Ordering::SeqCst),
            self.0.conf_injections.load(Ordering::SeqCst),
            self.0.tracer_injections.load(Ordering::SeqCst),
        )
    }

    pub fn conf_env_name(&self) -> Option<String> {
        self.0.conf_env_name.lock().clone()
    }

    pub async fn wait_started(&self) {
        let mut rx = self.0.started.subscribe();
        let _ = rx.wait_for(|started| *started).await;
    }

    pub async fn wait_stop_returned(&self) {
        let mut rx = self.0.stop_returned.subscribe();
        let _ = rx.wait_for(|returned| *returned).await;
    }
}

pub struct SpyApp {
    name: &'static str,
    capabilities: Capabilities,
    run_behavior: RunBehavior,
    stop_behavior: StopBehavior,
    counter: Option<IntCounter>,
    stopped: CancellationToken,
    handle: SpyHandle,
}

impl SpyApp {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            capabilities: Capabilities::default(),
            run_behavior: RunBehavior::default(),
            stop_behavior: StopBehavior::default(),
            counter: None,
            stopped: CancellationToken::new(),
            handle: SpyHandle::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_run(mut self, behavior: RunBehavior) -> Self {
        self.run_behavior = behavior;
        self
    }

    pub fn with_stop(mut self, behavior: StopBehavior) -> Self {
        self.stop_behavior = behavior;
        self
    }

    pub fn with_counter(mut self, name: &str) -> Self {
        self.counter = Some(IntCounter::new(name, "spy counter").unwrap());
        self
    }

    pub fn handle(&self) -> SpyHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Subsystem<TestConf> for SpyApp {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, ctx: AppContext) -> Result<(), SubsystemError> {
        self.handle.0.run_calls.fetch_add(1, Ordering::SeqCst);
        self.handle.0.started.send_replace(true);

        let result = match self.run_behavior {
            RunBehavior::UntilStopped => {
                tokio::select! {
                    _ = ctx.done() => Err(ctx.err().unwrap_or(ContextError::Canceled).into()),
                    _ = self.stopped.cancelled() => Ok(()),
                }
            }
            RunBehavior::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(SubsystemError::failed(format!("{} failed", self.name)))
            }
            RunBehavior::InnerDeadline(timeout) => {
                let inner = AppContext::background().with_timeout(timeout);
                inner.done().await;
                Err(inner.err().unwrap_or(ContextError::Canceled).into())
            }
            RunBehavior::FailWhenStopped => {
                self.stopped.cancelled().await;
                Err(SubsystemError::failed(format!("{} failed while stopping", self.name)))
            }
            RunBehavior::Panic => panic!("{} panicked", self.name),
            RunBehavior::ReturnImmediately => Ok(()),
        };
        self.handle.0.run_returned.send_replace(true);
        result
    }

    async fn stop(&self, ctx: AppContext) -> Result<(), SubsystemError> {
        self.handle.0.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.cancel();

        let result = match self.stop_behavior {
            StopBehavior::Prompt => Ok(()),
            StopBehavior::Fail => Err(SubsystemError::failed(format!("{} stop failed", self.name))),
            StopBehavior::Hang => std::future::pending().await,
            StopBehavior::UntilDone => {
                ctx.done().await;
                Err(ctx.err().unwrap_or(ContextError::Canceled).into())
            }
            StopBehavior::AwaitRun => {
                let mut run_returned = self.handle.0.run_returned.subscribe();
                let _ = run_returned.wait_for(|returned| *returned).await;
                Ok(())
            }
        };
        self.handle.0.stop_returned.send_replace(true);
        result
    }

    fn as_loggable(&mut self) -> Option<&mut dyn Loggable> {
        self.capabilities.logger.then_some(self as &mut dyn Loggable)
    }

    fn as_config_settable(&mut self) -> Option<&mut dyn ConfigSettable<TestConf>> {
        self.capabilities
            .config
            .then_some(self as &mut dyn ConfigSettable<TestConf>)
    }

    fn as_traceable(&mut self) -> Option<&mut dyn Traceable> {
        self.capabilities.tracer.then_some(self as &mut dyn Traceable)
    }

    fn as_metrics_exportable(&self) -> Option<&dyn MetricsExportable> {
        self.counter
            .as_ref()
            .map(|_| self as &dyn MetricsExportable)
    }
}

impl Loggable for SpyApp {
    fn set_logger(&mut self, _logger: SharedLogger) {
        self.handle.0.logger_injections.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConfigSettable<TestConf> for SpyApp {
    fn set_app_conf(&mut self, conf: Arc<TestConf>) {
        self.handle.0.conf_injections.fetch_add(1, Ordering::SeqCst);
        *self.handle.0.conf_env_name.lock() = Some(conf.env_name.clone());
    }
}

impl Traceable for SpyApp {
    fn set_tracer_provider(&mut self, _provider: SharedTracerProvider) {
        self.handle.0.tracer_injections.fetch_add(1, Ordering::SeqCst);
    }
}

impl MetricsExportable for SpyApp {
    fn prometheus_collectors(&self) -> Vec<Box<dyn Collector>> {
        self.counter
            .iter()
            .map(|counter| Box::new(counter.clone()) as Box<dyn Collector>)
            .collect()
    }
}
