//! Command dispatcher.
//!
//! Reads client commands one at a time and drives the session registry.
//! Malformed commands are logged and skipped; a read failure or close ends
//! the dispatcher and stops every session of the connection.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};

use crate::observability::metrics;
use crate::session::command::{Action, Command, CommandError};
use crate::session::registry::SessionRegistry;

/// Consume `inbound` until it ends or fails.
pub async fn run<St, E>(mut inbound: St, registry: &SessionRegistry)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(message) = inbound.next().await {
        let result = match message {
            Ok(Message::Text(text)) => handle_command(registry, text.as_str().as_bytes()),
            Ok(Message::Binary(data)) => handle_command(registry, &data),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(frame)) => {
                tracing::info!(close = ?frame, "Client closed connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Inbound read failed");
                break;
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Skipping command");
            metrics::record_command_rejected(e.reason());
        }
    }

    registry.stop_all();
}

/// Apply one raw command.
pub fn handle_command(registry: &SessionRegistry, payload: &[u8]) -> Result<(), CommandError> {
    match Command::parse(payload)?.into_action()? {
        Action::Play(request) => {
            tracing::info!(
                session_id = %request.stream_id,
                endpoint = %request.endpoint,
                format = %request.format,
                begin_time = request.original_time(),
                "Play"
            );
            registry.start(request);
        }
        Action::Stop { stream_id } => {
            tracing::info!(session_id = %stream_id, "Stop");
            registry.stop(&stream_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use url::Url;

    use crate::config::StreamConfig;
    use crate::session::backend::BackendTarget;
    use crate::session::pull::PullContext;

    async fn registry() -> SessionRegistry {
        // Accept and hold connections so sessions stay in Requesting.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (tx, rx) = mpsc::channel(1);
        std::mem::forget(rx);
        let backend = BackendTarget::new(url, "root".into(), "root".into(), reqwest::Client::new());
        SessionRegistry::new(PullContext::new(backend, &StreamConfig::default(), tx))
    }

    fn text(s: &str) -> Result<Message, Infallible> {
        Ok(Message::Text(s.into()))
    }

    #[tokio::test]
    async fn play_and_stop() {
        let registry = registry().await;
        handle_command(
            &registry,
            br#"{"Method":"play","Endpoint":"cam1","Format":"mjpeg","StreamId":"s1"}"#,
        )
        .unwrap();
        assert!(registry.is_active("s1"));

        handle_command(&registry, br#"{"Method":"stop","StreamId":"s1"}"#).unwrap();
        assert!(!registry.is_active("s1"));

        // Stopping again is fine.
        handle_command(&registry, br#"{"Method":"stop","StreamId":"s1"}"#).unwrap();
    }

    #[tokio::test]
    async fn malformed_commands_are_rejected_without_side_effects() {
        let registry = registry().await;

        let err = handle_command(&registry, b"{garbage").unwrap_err();
        assert_eq!(err.reason(), "json");
        let err = handle_command(&registry, br#"{"Method":"play","StreamId":"s2"}"#).unwrap_err();
        assert!(matches!(err, CommandError::MissingField("Endpoint")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn keeps_reading_past_bad_commands_until_close() {
        let registry = registry().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let inbound = Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        }));
        tx.send(text("{garbage")).unwrap();
        tx.send(Ok(Message::Ping(Default::default()))).unwrap();
        tx.send(text(r#"{"Method":"play","Endpoint":"cam1","StreamId":"s1"}"#))
            .unwrap();
        tx.send(Ok(Message::Binary(
            br#"{"Method":"play","Endpoint":"cam2","StreamId":"s3"}"#.to_vec().into(),
        )))
        .unwrap();

        let dispatcher = {
            let registry = registry.clone();
            tokio::spawn(async move { run(inbound, &registry).await })
        };

        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(Ok(Message::Close(None))).unwrap();
        dispatcher.await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn read_error_stops_all() {
        let registry = registry().await;
        handle_command(
            &registry,
            br#"{"Method":"play","Endpoint":"cam1","StreamId":"s1"}"#,
        )
        .unwrap();

        let inbound = futures_util::stream::iter(vec![Err::<Message, _>("connection reset")]);
        run(inbound, &registry).await;
        assert!(registry.is_empty());
    }
}
