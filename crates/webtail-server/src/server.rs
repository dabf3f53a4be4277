//! `WebtailServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{ServerConfig, StreamTimings};
use crate::container::Container;
use crate::health::{self, HealthResponse};
use crate::page;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_connection;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Active connection and current source.
    pub container: Arc<Container>,
    /// Root cancellation.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Per-connection timings.
    pub timings: StreamTimings,
    /// Largest inbound frame accepted.
    pub max_message_size: usize,
    /// Fallback for the page's socket host when the request has no `Host`.
    pub default_host: String,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The webtail server.
pub struct WebtailServer {
    config: ServerConfig,
    container: Arc<Container>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl WebtailServer {
    /// Create a server around `container`.
    pub fn new(config: ServerConfig, container: Container) -> Self {
        Self {
            config,
            container: Arc::new(container),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Expose `/metrics` using `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            container: self.container.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            timings: self.config.timings(),
            max_message_size: self.config.max_message_size,
            default_host: self.config.addr.clone(),
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/", get(home_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        router.layer(TraceLayer::new_for_http()).with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%local_addr, "webtail server listening");
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });
        Ok((local_addr, task))
    }

    /// The shared container.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /
async fn home_handler(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(state.default_host.as_str());
    Html(page::render_home(host))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let token = state.shutdown.token();
    let _ = run_connection(state.container, sink, stream, state.timings, &token).await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, &state.container))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(crate::metrics::render)
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
