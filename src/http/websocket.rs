//! WebSocket gateway connection.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with the client
//! - Give the connection its own packet queue and session registry
//! - Run the command dispatcher and the fan-in multiplexer side by side
//! - Tear everything down when either side ends or the server shuts down
//!
//! # Data Flow
//! ```text
//! Client ──commands──▶ dispatcher ──▶ registry ──▶ pull tasks ──▶ backend
//! Client ◀──packets─── multiplexer ◀── packet queue ◀── pull tasks
//! ```

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

use crate::http::server::AppState;
use crate::session::{dispatcher, multiplexer, PullContext, SessionRegistry};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    // Subscribe before the upgrade completes so a shutdown racing the
    // handshake is not missed.
    let shutdown = state.shutdown.subscribe();
    ws.on_upgrade(move |socket| serve_connection(socket, state, peer, shutdown))
}

async fn serve_connection(
    socket: WebSocket,
    state: AppState,
    peer: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) {
    let guard = state.connections.track();
    let span = tracing::info_span!("connection", connection_id = %guard.id(), peer = %peer);

    async move {
        tracing::info!("Client connected");
        let (sink, inbound) = socket.split();

        let (packets_tx, packets_rx) = mpsc::channel(state.config.stream.packet_queue_capacity);
        let context = PullContext::new(state.backend.clone(), &state.config.stream, packets_tx);
        let registry = SessionRegistry::new(context);

        let mut writer = tokio::spawn(
            multiplexer::run(packets_rx, sink, registry.clone()).in_current_span(),
        );

        tokio::select! {
            _ = dispatcher::run(inbound, &registry) => {
                tracing::debug!("Dispatcher finished");
            }
            exit = &mut writer => {
                tracing::debug!(exit = ?exit.ok(), "Multiplexer finished");
            }
            _ = shutdown.recv() => {
                tracing::info!("Closing connection for shutdown");
            }
        }

        registry.stop_all();
        writer.abort();
        tracing::info!("Client disconnected");
    }
    .instrument(span)
    .await;

    drop(guard);
}
