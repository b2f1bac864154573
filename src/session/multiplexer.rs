//! Fan-in multiplexer.
//!
//! # Responsibilities
//! - Drain the shared packet queue of one client connection
//! - Write packets to the outbound socket one at a time
//! - Discard packets of sessions stopped after they were queued
//! - Tear down every session when the socket stops accepting writes
//!
//! # Data Flow
//! ```text
//! pull task ─┐
//! pull task ─┼─▶ mpsc (bounded) ─▶ multiplexer ─▶ WebSocket sink
//! pull task ─┘
//! ```

use std::fmt::Display;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::session::pull::Outbound;
use crate::session::registry::SessionRegistry;

/// Why the multiplexer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexerExit {
    /// Every producer went away.
    QueueClosed,
    /// A write failed; all sessions were stopped.
    WriteFailed,
}

/// Serialize queued packets onto `sink` until the queue closes or a write fails.
pub async fn run<S>(
    mut packets: mpsc::Receiver<Outbound>,
    mut sink: S,
    registry: SessionRegistry,
) -> MultiplexerExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(packet) = packets.recv().await {
        if packet.stopped.is_set() {
            tracing::trace!(session_id = %packet.stream_id, "Discarding packet of stopped session");
            continue;
        }

        let len = packet.data.len();
        if let Err(e) = sink.send(Message::Binary(packet.data)).await {
            tracing::warn!(
                session_id = %packet.stream_id,
                error = %e,
                "Outbound write failed, stopping all sessions"
            );
            registry.stop_all();
            return MultiplexerExit::WriteFailed;
        }
        metrics::record_packet(len);
    }

    tracing::debug!("Packet queue closed");
    MultiplexerExit::QueueClosed
}
