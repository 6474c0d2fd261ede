//! # App Runner
//!
//! Drives the wired subsystem list through one lifecycle.
//!
//! ```text
//!              run(ctx)
//!   Idle ──────────────→ Starting ──(all tasks spawned)──→ Running
//!                                                            │
//!                       ctx done  or  first subsystem error   │
//!                                                            ↓
//!                                                      ShuttingDown
//!                                                            │
//!                       stop_apps(ctx.without_cancel())       │
//!                             ┌──────────────┬───────────────┤
//!                             ↓              ↓               ↓
//!                          Stopped        Failed          TimedOut
//! ```
//!
//! Only `Idle` accepts `run`; a second call, concurrent or later, is
//! rejected with [`RunnerError::NotIdle`]. `stop_apps` may be called on its
//! own at any time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use app_telemetry::SharedLogger;
use futures::FutureExt;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::context::AppContext;
use crate::error::{ContextError, RunnerError, SubsystemError};
use crate::options::RunnerOptions;
use crate::subsystem::{named_tracer, Subsystem};
use crate::wiring;

/// Instrumentation name of the runner's own tracer.
pub const TRACER_NAME: &str = "apprunner";

/// Lifecycle state of one runner instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Built, `run` not called yet.
    Idle,
    /// Start tasks are being spawned.
    Starting,
    /// Every start task is dispatched; waiting for cancellation or failure.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
    /// Canceled and every subsystem stopped cleanly.
    Stopped,
    /// A subsystem failed, or shutdown reported stop errors.
    Failed,
    /// Canceled, but shutdown exceeded the exit wait.
    TimedOut,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed | Self::TimedOut)
    }
}

/// Runs a fixed set of subsystems concurrently and shuts them all down
/// together.
pub struct AppRunner<C = ()> {
    apps: Vec<Arc<dyn Subsystem<C>>>,
    logger: SharedLogger,
    tracer: BoxedTracer,
    exit_wait: Duration,
    state: Mutex<RunState>,
}

impl<C: Send + Sync + 'static> AppRunner<C> {
    /// Build a runner around `main_app`.
    ///
    /// Collector registration and capability injection happen here; nothing
    /// is started.
    pub fn new<A>(
        main_app: A,
        app_conf: impl Into<Arc<C>>,
        options: RunnerOptions<C>,
    ) -> Result<Self, RunnerError>
    where
        A: Subsystem<C>,
    {
        Self::from_boxed(Some(Box::new(main_app)), app_conf, options)
    }

    /// Same as [`AppRunner::new`] for an already boxed (possibly absent) main
    /// subsystem.
    pub fn from_boxed(
        main_app: Option<Box<dyn Subsystem<C>>>,
        app_conf: impl Into<Arc<C>>,
        options: RunnerOptions<C>,
    ) -> Result<Self, RunnerError> {
        let main_app = main_app.ok_or(RunnerError::MissingMainApp)?;
        let config = options.build()?;
        let exit_wait = config.exit_wait();

        let wired = wiring::wire(main_app, app_conf.into(), config)?;
        let tracer = named_tracer(&wired.tracer_provider, TRACER_NAME);

        Ok(Self {
            apps: wired.apps,
            logger: wired.logger,
            tracer,
            exit_wait,
            state: Mutex::new(RunState::Idle),
        })
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn exit_wait(&self) -> Duration {
        self.exit_wait
    }

    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    /// Names of the managed subsystems in start order.
    pub fn app_names(&self) -> Vec<&'static str> {
        self.apps.iter().map(|app| app.name()).collect()
    }

    fn begin_run(&self) -> Result<(), RunnerError> {
        let mut state = self.state.lock();
        if *state != RunState::Idle {
            return Err(RunnerError::NotIdle(*state));
        }
        *state = RunState::Starting;
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        *self.state.lock() = next;
    }

    /// Start every subsystem and block until `ctx` is done or one of them
    /// fails, then stop them all.
    ///
    /// Returns `Ok(())` after a clean cancellation. A subsystem failure is
    /// returned as is when shutdown succeeds, joined with the shutdown error
    /// otherwise.
    pub async fn run(&self, ctx: AppContext) -> Result<(), RunnerError> {
        self.begin_run()?;

        let mut span = self.tracer.start("apprunner.run");
        span.set_attribute(KeyValue::new("apprunner.apps", self.apps.len() as i64));

        // Sized so no producer ever waits on the receiver.
        let (err_tx, mut err_rx) = mpsc::channel::<RunnerError>(self.apps.len().max(1));
        let mut running = JoinSet::new();

        for app in &self.apps {
            let app = Arc::clone(app);
            let ctx = ctx.clone();
            let err_tx = err_tx.clone();
            let logger = Arc::clone(&self.logger);
            running.spawn(async move {
                let name = app.name();
                let outcome = AssertUnwindSafe(app.run(ctx.clone()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(SubsystemError::Panicked(panic_message(&*panic))));
                match outcome {
                    Ok(()) => {}
                    // Only the run context ending makes a context error a clean stop.
                    Err(source) if source.is_context() && ctx.is_done() => {}
                    Err(source) => {
                        let failure = RunnerError::AppStart { app: name, source };
                        if let Err(unsent) = err_tx.try_send(failure) {
                            logger.debug(&format!(
                                "App failed after the runner stopped listening: {}",
                                unsent.into_inner()
                            ));
                        }
                    }
                }
            });
        }
        drop(err_tx);
        self.set_state(RunState::Running);

        // A closed channel (every subsystem returned cleanly) disables the
        // second branch; only cancellation is left to wait for.
        let first_failure = tokio::select! {
            _ = ctx.done() => None,
            Some(failure) = err_rx.recv() => Some(failure),
        };

        self.set_state(RunState::ShuttingDown);
        let failed = first_failure.is_some();

        let result = match first_failure {
            None => {
                self.logger.info("Context canceled, stopping apps");
                self.stop_apps(ctx.without_cancel())
                    .await
                    .map_err(|stop_err| RunnerError::Shutdown(Box::new(stop_err)))
            }
            Some(failure) => {
                self.logger
                    .error(&format!("App failed, stopping all apps: {failure}"));
                match self.stop_apps(ctx.without_cancel()).await {
                    Ok(()) => Err(failure),
                    Err(stop_err) => Err(RunnerError::pair(
                        failure,
                        RunnerError::Shutdown(Box::new(stop_err)),
                    )),
                }
            }
        };

        while let Ok(late) = err_rx.try_recv() {
            self.logger
                .warn(&format!("App failed after shutdown was triggered: {late}"));
        }

        while running.try_join_next().is_some() {}
        if !running.is_empty() {
            self.logger.debug(&format!(
                "{} app run task(s) still finishing after shutdown, detaching",
                running.len()
            ));
            running.detach_all();
        }

        let final_state = match &result {
            _ if failed => RunState::Failed,
            Ok(()) => RunState::Stopped,
            Err(err) if err.is_timeout() => RunState::TimedOut,
            Err(_) => RunState::Failed,
        };
        self.set_state(final_state);

        if let Err(err) = &result {
            span.set_status(Status::error(err.to_string()));
        }
        span.end();

        result
    }

    /// Stop every subsystem concurrently, waiting at most the exit wait.
    ///
    /// Stop errors are joined. If the exit wait elapses first the stop
    /// context is canceled, the subsystems still stopping are logged and
    /// left behind, and [`RunnerError::ExitWaitExceeded`] is returned.
    pub async fn stop_apps(&self, ctx: AppContext) -> Result<(), RunnerError> {
        let mut span = self.tracer.start("apprunner.stop_apps");

        let stop_ctx = ctx.with_timeout(self.exit_wait);
        let _cancel_on_return = stop_ctx.token().clone().drop_guard();

        let mut stopping = JoinSet::new();
        for (index, app) in self.apps.iter().enumerate() {
            let app = Arc::clone(app);
            let ctx = stop_ctx.clone();
            stopping.spawn(async move {
                let outcome = AssertUnwindSafe(app.stop(ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(SubsystemError::Panicked(panic_message(&*panic))));
                (index, outcome)
            });
        }

        let mut stopped = vec![false; self.apps.len()];
        let mut errors = Vec::new();

        let all_stopped = async {
            while let Some(joined) = stopping.join_next().await {
                match joined {
                    Ok((index, outcome)) => {
                        stopped[index] = true;
                        if let Err(source) = outcome {
                            errors.push(RunnerError::AppStop {
                                app: self.apps[index].name(),
                                source,
                            });
                        }
                    }
                    Err(join_err) => {
                        self.logger
                            .error(&format!("App stop task did not complete: {join_err}"));
                    }
                }
            }
        };

        let timed_out = tokio::select! {
            biased;
            _ = all_stopped => false,
            _ = stop_ctx.done() => true,
        };

        let result = if timed_out {
            let pending: Vec<&'static str> = self
                .apps
                .iter()
                .zip(&stopped)
                .filter(|(_, done)| !**done)
                .map(|(app, _)| app.name())
                .collect();
            self.logger.warn(&format!(
                "Stopping apps exceeded exit wait of {:?}, abandoning: {}",
                self.exit_wait,
                pending.join(", ")
            ));
            stopping.detach_all();
            span.set_attribute(KeyValue::new("apprunner.pending", pending.len() as i64));
            Err(RunnerError::ExitWaitExceeded {
                pending: pending.len(),
                source: stop_ctx.err().unwrap_or(ContextError::DeadlineExceeded),
            })
        } else {
            for err in &errors {
                self.logger.error(&err.to_string());
            }
            RunnerError::join(errors).map_or(Ok(()), Err)
        };

        if let Err(err) = &result {
            span.set_status(Status::error(err.to_string()));
        }
        span.end();

        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
