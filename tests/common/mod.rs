//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use video_gateway::config::GatewayConfig;
use video_gateway::http::GatewayServer;
use video_gateway::lifecycle::Shutdown;
use video_gateway::stream::Packet;

pub const BOUNDARY: &str = "frame";

/// What a mock backend answers to every request.
#[derive(Clone)]
pub enum Reply {
    /// A complete body with Content-Length.
    Body {
        content_type: String,
        body: Vec<u8>,
    },
    /// A close-delimited body written chunk by chunk.
    Chunks {
        content_type: String,
        chunks: Vec<Vec<u8>>,
        delay: Duration,
    },
    /// Multipart parts forever, until the client goes away.
    EndlessMultipart { interval: Duration },
}

pub struct MockBackend {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<String>,
    client_gone: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Head of the next request the backend received.
    pub async fn next_request(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("backend saw no request")
            .expect("backend stopped")
    }

    /// Whether an endless stream noticed its client disconnect.
    pub fn client_gone(&self) -> bool {
        self.client_gone.load(Ordering::SeqCst)
    }
}

/// Start a mock backend on an ephemeral port.
pub async fn start_backend(reply: Reply) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, requests) = mpsc::unbounded_channel();
    let client_gone = Arc::new(AtomicBool::new(false));
    let gone = client_gone.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let reply = reply.clone();
            let tx = tx.clone();
            let gone = gone.clone();
            tokio::spawn(async move {
                serve(socket, reply, tx, gone).await;
            });
        }
    });

    MockBackend {
        addr,
        requests,
        client_gone,
    }
}

async fn serve(
    mut socket: TcpStream,
    reply: Reply,
    requests: mpsc::UnboundedSender<String>,
    client_gone: Arc<AtomicBool>,
) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let _ = requests.send(String::from_utf8_lossy(&head).into_owned());

    match reply {
        Reply::Body { content_type, body } => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        }
        Reply::Chunks {
            content_type,
            chunks,
            delay,
        } => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                content_type
            );
            let _ = socket.write_all(response.as_bytes()).await;
            for chunk in chunks {
                if socket.write_all(&chunk).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
            }
        }
        Reply::EndlessMultipart { interval } => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                multipart_content_type()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let mut n: u64 = 0;
            loop {
                let payload = format!("frame-{}", n);
                let part = multipart_part("20240101T000000", payload.as_bytes());
                if socket.write_all(&part).await.is_err() {
                    client_gone.store(true, Ordering::SeqCst);
                    return;
                }
                n += 1;
                tokio::time::sleep(interval).await;
            }
        }
    }

    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn multipart_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// One part, delimiter first.
pub fn multipart_part(original_time: &str, payload: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nX-Video-Original-Time: {}\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        original_time,
        payload.len()
    )
    .into_bytes();
    part.extend_from_slice(payload);
    part.extend_from_slice(b"\r\n");
    part
}

pub fn multipart_close() -> Vec<u8> {
    format!("--{}--\r\n", BOUNDARY).into_bytes()
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestGateway {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a gateway in front of `backend_url` on an ephemeral port.
pub async fn start_gateway(backend_url: &str, tweak: impl FnOnce(&mut GatewayConfig)) -> TestGateway {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.url = backend_url.into();
    tweak(&mut config);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config, shutdown.clone()).unwrap();
    let task = tokio::spawn(server.run(listener));

    TestGateway {
        addr,
        shutdown,
        task,
    }
}

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(gateway: &TestGateway) -> Client {
    let (client, _) = connect_async(gateway.ws_url()).await.unwrap();
    client
}

pub async fn send_json(client: &mut Client, value: serde_json::Value) {
    client.send(Message::text(value.to_string())).await.unwrap();
}

/// Next binary packet, or `None` if none arrives within `wait`.
pub async fn next_packet(client: &mut Client, wait: Duration) -> Option<Packet> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let message = tokio::time::timeout_at(deadline, client.next()).await.ok()??;
        match message.ok()? {
            Message::Binary(data) => return Some(Packet::parse(data).expect("well-formed packet")),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Collect packets until none arrives for `quiet`.
pub async fn drain_packets(client: &mut Client, quiet: Duration) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Some(packet) = next_packet(client, quiet).await {
        packets.push(packet);
    }
    packets
}

/// Collect every packet that arrives within `window`, however busy the stream.
pub async fn collect_for(client: &mut Client, window: Duration) -> Vec<Packet> {
    let deadline = tokio::time::Instant::now() + window;
    let mut packets = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return packets;
        }
        match next_packet(client, remaining).await {
            Some(packet) => packets.push(packet),
            None => return packets,
        }
    }
}
