//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: WebSocket gateway route plus proxy fallback
//! - Wire up middleware (request ID, tracing)
//! - Serve over plain TCP or TLS until shutdown
//! - Wait for open WebSocket connections to wind down

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::proxy::proxy_handler;
use crate::http::websocket::ws_handler;
use crate::lifecycle::{shutdown, Shutdown};
use crate::net::ConnectionTracker;
use crate::session::{BackendError, BackendTarget};

/// How long shutdown waits for WebSocket connections to close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub backend: BackendTarget,
    pub proxy_client: Client<HttpConnector, Body>,
    pub connections: ConnectionTracker,
    pub shutdown: Shutdown,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// HTTP server for the video gateway.
pub struct GatewayServer {
    router: Router,
    connections: ConnectionTracker,
    shutdown_rx: broadcast::Receiver<()>,
}

impl GatewayServer {
    /// Build the server. `shutdown` stops it and every open connection.
    pub fn new(config: GatewayConfig, shutdown: Shutdown) -> Result<Self, ServerError> {
        let backend = BackendTarget::from_config(&config.backend)?;
        let proxy_client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let connections = ConnectionTracker::new();
        let shutdown_rx = shutdown.subscribe();

        let state = AppState {
            config: Arc::new(config),
            backend,
            proxy_client,
            connections: connections.clone(),
            shutdown,
        };

        Ok(Self {
            router: Self::build_router(state),
            connections,
            shutdown_rx,
        })
    }

    fn build_router(state: AppState) -> Router {
        let ws_path = state.config.stream.ws_path.clone();
        Router::new()
            .route(&ws_path, get(ws_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");
                        tracing::info_span!(
                            "request",
                            request_id = %request_id,
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Open WebSocket connections.
    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Serve plain HTTP on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(self.shutdown_rx))
            .await?;

        Self::drain(&self.connections).await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until shutdown.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "Gateway listening (TLS)");

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        let shutdown_rx = self.shutdown_rx;
        tokio::spawn(async move {
            shutdown::wait(shutdown_rx).await;
            shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        Self::drain(&self.connections).await;
        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    async fn drain(connections: &ConnectionTracker) {
        let open = connections.active_count();
        if open == 0 {
            return;
        }
        tracing::info!(connections = open, "Waiting for WebSocket connections to close");
        if !connections.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                connections = connections.active_count(),
                "Connections still open after drain timeout"
            );
        }
    }
}
