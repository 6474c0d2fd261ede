//! A minimal HTTP subsystem answering `GET /?name=x`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use app_runner::{
    named_tracer, AppContext, ConfigSettable, ContextError, Loggable, MetricsExportable,
    SharedTracerProvider, Subsystem, SubsystemError, Traceable,
};
use app_telemetry::{noop_logger, SharedLogger};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::KeyValue;
use prometheus::core::Collector;
use prometheus::IntCounter;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::DemoConf;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct GreetParams {
    #[serde(default)]
    name: String,
}

#[derive(Clone)]
struct HandlerState {
    requests: IntCounter,
    tracer: Option<Arc<BoxedTracer>>,
}

async fn greet(State(state): State<HandlerState>, Query(params): Query<GreetParams>) -> String {
    state.requests.inc();
    if let Some(tracer) = &state.tracer {
        let mut span = tracer.start("handle-request");
        span.set_attribute(KeyValue::new("name", params.name.clone()));
        span.end();
    }
    format!("main-handler: {}\n", params.name)
}

pub struct SimpleApp {
    addr: SocketAddr,
    shutdown_timeout: Duration,
    requests: IntCounter,
    shutdown: CancellationToken,
    serving: watch::Sender<Option<SocketAddr>>,
    logger: SharedLogger,
    conf: Option<Arc<DemoConf>>,
    tracer: Option<Arc<BoxedTracer>>,
}

impl SimpleApp {
    pub fn new(addr: SocketAddr) -> Result<Self, prometheus::Error> {
        let requests = IntCounter::new(
            "simple_app_requests_total",
            "Requests handled by the simple app",
        )?;
        Ok(Self {
            addr,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            requests,
            shutdown: CancellationToken::new(),
            serving: watch::channel(None).0,
            logger: noop_logger(),
            conf: None,
            tracer: None,
        })
    }

    /// Follows the bound address; `None` before `run` binds and after it ends.
    pub fn watch_serving(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.serving.subscribe()
    }

    pub fn env_name(&self) -> Option<&str> {
        self.conf.as_deref().map(|conf| conf.env_name.as_str())
    }
}

#[async_trait]
impl Subsystem<DemoConf> for SimpleApp {
    fn name(&self) -> &'static str {
        "simple-app"
    }

    async fn run(&self, ctx: AppContext) -> Result<(), SubsystemError> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        let router = Router::new().route("/", get(greet)).with_state(HandlerState {
            requests: self.requests.clone(),
            tracer: self.tracer.clone(),
        });

        self.serving.send_replace(Some(local_addr));
        self.logger.info(&format!(
            "simple server started on {local_addr} (env: {})",
            self.env_name().unwrap_or("unknown")
        ));

        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = ctx.done() => {}
                }
            })
            .await;

        self.serving.send_replace(None);
        served.map_err(|e| SubsystemError::failed(format!("simple server failed: {e}")))
    }

    async fn stop(&self, ctx: AppContext) -> Result<(), SubsystemError> {
        self.shutdown.cancel();

        let mut serving = self.serving.subscribe();
        if serving.borrow().is_none() {
            return Ok(());
        }

        self.logger.debug("stopping simple server gracefully");
        let shutdown_ctx = ctx.with_timeout(self.shutdown_timeout);
        tokio::select! {
            _ = serving.wait_for(Option::is_none) => {
                self.logger.info("simple server stopped");
                Ok(())
            }
            _ = shutdown_ctx.done() => {
                let cause = shutdown_ctx.err().unwrap_or(ContextError::Canceled);
                Err(SubsystemError::failed(format!("failed to stop simple server: {cause}")))
            }
        }
    }

    fn as_loggable(&mut self) -> Option<&mut dyn Loggable> {
        Some(self)
    }

    fn as_config_settable(&mut self) -> Option<&mut dyn ConfigSettable<DemoConf>> {
        Some(self)
    }

    fn as_traceable(&mut self) -> Option<&mut dyn Traceable> {
        Some(self)
    }

    fn as_metrics_exportable(&self) -> Option<&dyn MetricsExportable> {
        Some(self)
    }
}

impl Loggable for SimpleApp {
    fn set_logger(&mut self, logger: SharedLogger) {
        self.logger = logger;
    }
}

impl ConfigSettable<DemoConf> for SimpleApp {
    fn set_app_conf(&mut self, conf: Arc<DemoConf>) {
        self.conf = Some(conf);
    }
}

impl Traceable for SimpleApp {
    fn set_tracer_provider(&mut self, provider: SharedTracerProvider) {
        self.tracer = Some(Arc::new(named_tracer(&provider, "simple-app")));
    }
}

impl MetricsExportable for SimpleApp {
    fn prometheus_collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![Box::new(self.requests.clone())]
    }
}
