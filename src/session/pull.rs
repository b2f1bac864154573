//! Pull task: one backend request driven to completion.
//!
//! # State Machine
//! ```text
//! Requesting ──response──▶ Streaming ──reader end──▶ Exhausted
//!     │                        │
//!     │ connect error,         │ stop signal
//!     │ bad content type       ▼
//!     ▼                     Stopped
//!   Failed
//!
//! Snapshot responses skip the poll loop:
//! Requesting ──image/jpeg──▶ deliver one packet ──▶ hold until stop ──▶ Stopped
//!                                               └─▶ Delivered (hold disabled)
//! ```
//!
//! # Design Decisions
//! - Every await point races the stop signal, so a stopped task exits within
//!   one step and never blocks on a full packet queue
//! - Dropping the response on exit aborts the backend transfer
//! - The task never touches the registry; the registry wraps it

use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use reqwest::Response;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::StreamConfig;
use crate::session::backend::BackendTarget;
use crate::session::cancel::{StopFlag, StopSignal};
use crate::session::command::{CommandError, PlayRequest};
use crate::stream::{
    classify, read_snapshot, EndpointPrefix, MediaError, MediaKind, PacketError, StreamError,
    StreamReader,
};

/// How a pull task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Stopped by the client, a replacing play, or connection close.
    Stopped,
    /// The backend body ended or became unreadable.
    Exhausted,
    /// A snapshot was delivered and the session released right away.
    Delivered,
    /// No stream could be established.
    Failed,
}

impl PullOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullOutcome::Stopped => "stopped",
            PullOutcome::Exhausted => "exhausted",
            PullOutcome::Delivered => "delivered",
            PullOutcome::Failed => "failed",
        }
    }
}

/// A framed packet on its way to the multiplexer.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub stream_id: Arc<str>,
    pub stopped: StopFlag,
    pub data: Bytes,
}

/// Everything a pull task needs besides its request and stop signal.
/// One per client connection.
#[derive(Debug)]
pub struct PullContext {
    pub backend: BackendTarget,
    pub chunk_size: usize,
    pub hold_snapshot_sessions: bool,
    pub packets: mpsc::Sender<Outbound>,
}

impl PullContext {
    pub fn new(backend: BackendTarget, stream: &StreamConfig, packets: mpsc::Sender<Outbound>) -> Self {
        Self {
            backend,
            chunk_size: stream.chunk_size,
            hold_snapshot_sessions: stream.hold_snapshot_sessions,
            packets,
        }
    }
}

#[derive(Debug, Error)]
enum PullError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Run one session until it is stopped, exhausted, or fails.
pub async fn run(ctx: Arc<PullContext>, request: PlayRequest, mut signal: StopSignal) -> PullOutcome {
    let span = tracing::info_span!(
        "pull",
        session_id = %request.stream_id,
        endpoint = %request.endpoint,
    );

    async move {
        match pull(&ctx, &request, &mut signal).await {
            Ok(outcome) => {
                tracing::info!(outcome = outcome.as_str(), "Session ended");
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session failed");
                PullOutcome::Failed
            }
        }
    }
    .instrument(span)
    .await
}

async fn pull(
    ctx: &PullContext,
    request: &PlayRequest,
    signal: &mut StopSignal,
) -> Result<PullOutcome, PullError> {
    let prefix = EndpointPrefix::new(&request.endpoint)?;
    let media_request = ctx.backend.media_request(request)?;

    tracing::info!(
        source = request.source().as_str(),
        format = %request.format,
        "Requesting backend media"
    );

    let response = tokio::select! {
        biased;
        _ = signal.stopped() => return Ok(PullOutcome::Stopped),
        response = media_request.send() => response?,
    };

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    tracing::debug!(status = %response.status(), content_type = %content_type, "Backend responded");

    let queue = Queue {
        packets: &ctx.packets,
        stream_id: Arc::from(request.stream_id.as_str()),
        flag: signal.flag(),
    };

    let mut reader = match classify(&content_type)? {
        MediaKind::Snapshot => {
            return deliver_snapshot(ctx, &queue, response, &prefix, request, signal).await;
        }
        MediaKind::Multipart { boundary } => StreamReader::multipart(response, &boundary, prefix),
        MediaKind::Continuous => StreamReader::continuous(response, ctx.chunk_size, prefix),
    };

    tracing::info!(reader = reader.kind(), "Streaming");
    let mut produced: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = signal.stopped() => return Ok(PullOutcome::Stopped),
            next = reader.next() => next,
        };

        match next {
            Ok(Some(packet)) => {
                if !queue.push(signal, packet).await {
                    return Ok(PullOutcome::Stopped);
                }
                produced += 1;
            }
            Ok(None) => {
                tracing::debug!(packets = produced, "Backend stream ended");
                return Ok(PullOutcome::Exhausted);
            }
            Err(e) => {
                tracing::warn!(packets = produced, error = %e, "Backend stream read failed");
                return Ok(PullOutcome::Exhausted);
            }
        }
    }
}

async fn deliver_snapshot(
    ctx: &PullContext,
    queue: &Queue<'_>,
    response: Response,
    prefix: &EndpointPrefix,
    request: &PlayRequest,
    signal: &mut StopSignal,
) -> Result<PullOutcome, PullError> {
    let packet = tokio::select! {
        biased;
        _ = signal.stopped() => return Ok(PullOutcome::Stopped),
        packet = read_snapshot(response, prefix, request.original_time()) => packet?,
    };

    if !queue.push(signal, packet).await {
        return Ok(PullOutcome::Stopped);
    }
    if !ctx.hold_snapshot_sessions {
        return Ok(PullOutcome::Delivered);
    }

    tracing::debug!("Snapshot delivered, holding session until stopped");
    signal.stopped().await;
    Ok(PullOutcome::Stopped)
}

/// Enqueue side of the shared packet queue for one session.
struct Queue<'a> {
    packets: &'a mpsc::Sender<Outbound>,
    stream_id: Arc<str>,
    flag: StopFlag,
}

impl Queue<'_> {
    /// Returns `false` if the session was stopped or the queue is gone.
    async fn push(&self, signal: &mut StopSignal, data: Bytes) -> bool {
        let packet = Outbound {
            stream_id: self.stream_id.clone(),
            stopped: self.flag.clone(),
            data,
        };

        tokio::select! {
            biased;
            _ = signal.stopped() => false,
            sent = self.packets.send(packet) => {
                if sent.is_err() {
                    tracing::debug!("Packet queue closed");
                }
                sent.is_ok()
            }
        }
    }
}
