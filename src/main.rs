//! Video streaming WebSocket gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────────────┐
//!                    │                    VIDEO GATEWAY                       │
//!                    │                                                        │
//!   WebSocket        │  ┌─────────┐   ┌────────────┐   ┌──────────┐           │
//!   commands ────────┼─▶│  http   │──▶│ dispatcher │──▶│ registry │           │
//!                    │  │websocket│   └────────────┘   └────┬─────┘           │
//!                    │  └─────────┘                         │ spawn           │
//!                    │       ▲                              ▼                 │
//!   binary           │  ┌────┴────────┐  packet  ┌──────────────┐  GET        │
//!   packets ◀────────┼──│ multiplexer │◀─ queue ─│  pull tasks  │─────────────┼──▶ Backend
//!                    │  └─────────────┘          │  + stream::* │◀────────────┼─── media
//!                    │                           └──────────────┘             │
//!                    │                                                        │
//!   other HTTP ──────┼─▶ proxy ──────────────────────────────────────────────┼──▶ Backend
//!                    │                                                        │
//!                    │  config · lifecycle · observability · net (TLS)        │
//!                    └────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use video_gateway::config::GatewayConfig;
use video_gateway::http::GatewayServer;
use video_gateway::lifecycle::{resolve_config, signals, Shutdown, StartupOverrides};
use video_gateway::net::tls::load_tls_config;
use video_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "video-gateway")]
#[command(about = "WebSocket gateway for live and archive video streams", long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(long)]
    backend: Option<String>,

    /// Port to listen on
    #[arg(long)]
    listen: Option<u16>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> StartupOverrides {
        StartupOverrides {
            config_path: self.config.clone(),
            backend_url: self.backend.clone(),
            bind_address: self.listen.map(|port| format!("0.0.0.0:{}", port)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = resolve_config(&args.overrides())?;

    logging::init_logging(config.observability.log_format);
    tracing::info!("video-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    log_config(&config);

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let bind_address: SocketAddr = config.listener.bind_address.parse()?;
    let tls = config.listener.tls.clone();
    let server = GatewayServer::new(config, shutdown)?;

    match tls {
        Some(tls) => {
            let rustls = load_tls_config(&tls).await?;
            server.run_tls(bind_address, rustls).await?;
        }
        None => {
            let listener = TcpListener::bind(bind_address).await?;
            server.run(listener).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_config(config: &GatewayConfig) {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        backend = %config.backend.url,
        ws_path = %config.stream.ws_path,
        chunk_size = config.stream.chunk_size,
        queue_capacity = config.stream.packet_queue_capacity,
        hold_snapshot_sessions = config.stream.hold_snapshot_sessions,
        "Configuration loaded"
    );
}
