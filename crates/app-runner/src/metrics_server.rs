//! Prometheus metrics server subsystem.
//!
//! Owns the registry that collectors from `MetricsExportable` subsystems are
//! registered with, and serves it on `GET /metrics`. The runner appends it
//! after every other subsystem so it starts and stops with them.

use std::net::SocketAddr;

use app_telemetry::{encode_registry, noop_logger, SharedLogger};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::core::Collector;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::error::{ContextError, SubsystemError};
use crate::subsystem::{Loggable, Subsystem};

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// `run` has not bound a listener yet.
    Idle,
    /// Accepting scrapes on this address.
    Serving(SocketAddr),
    /// The listener is closed.
    Stopped,
}

/// Serves a Prometheus registry over HTTP.
pub struct MetricsServerApp {
    addr: SocketAddr,
    registry: Registry,
    shutdown: CancellationToken,
    state: watch::Sender<ServerState>,
    logger: SharedLogger,
}

impl MetricsServerApp {
    /// Server for `addr`; port 0 picks a free port (see [`MetricsServerApp::watch_state`]).
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_registry(addr, Registry::new())
    }

    pub fn with_registry(addr: SocketAddr, registry: Registry) -> Self {
        let (state, _) = watch::channel(ServerState::Idle);
        Self {
            addr,
            registry,
            shutdown: CancellationToken::new(),
            state,
            logger: noop_logger(),
        }
    }

    /// Register collectors, stopping at the first conflict.
    pub fn register_collectors(
        &self,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Result<(), prometheus::Error> {
        for collector in collectors {
            self.registry.register(collector)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Receiver that follows the server state; usable after the server has
    /// been moved into a runner.
    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.state.borrow() {
            ServerState::Serving(addr) => Some(addr),
            _ => None,
        }
    }
}

async fn serve_metrics(State(registry): State<Registry>) -> Response {
    match encode_registry(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> Subsystem<C> for MetricsServerApp {
    fn name(&self) -> &'static str {
        "metrics-server"
    }

    async fn run(&self, ctx: AppContext) -> Result<(), SubsystemError> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        let router = Router::new()
            .route("/metrics", get(serve_metrics))
            .with_state(self.registry.clone());

        self.state.send_replace(ServerState::Serving(local_addr));
        self.logger
            .info(&format!("metrics server started on {local_addr}"));

        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = ctx.done() => {}
                }
            })
            .await;

        self.state.send_replace(ServerState::Stopped);
        served?;
        self.logger.info("metrics server stopped");
        Ok(())
    }

    async fn stop(&self, ctx: AppContext) -> Result<(), SubsystemError> {
        self.shutdown.cancel();

        let mut state = self.state.subscribe();
        if !matches!(*state.borrow(), ServerState::Serving(_)) {
            // never started, or already closed
            return Ok(());
        }

        self.logger.debug("stopping metrics server gracefully");
        tokio::select! {
            _ = state.wait_for(|s| !matches!(s, ServerState::Serving(_))) => Ok(()),
            _ = ctx.done() => Err(ctx.err().unwrap_or(ContextError::Canceled).into()),
        }
    }

    fn as_loggable(&mut self) -> Option<&mut dyn Loggable> {
        Some(self)
    }
}

impl Loggable for MetricsServerApp {
    fn set_logger(&mut self, logger: SharedLogger) {
        self.logger = logger;
    }
}
