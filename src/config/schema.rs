//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the video gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Video backend that streams are pulled from and requests proxied to.
    pub backend: BackendConfig,

    /// Streaming session settings.
    pub stream: StreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9999").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9999".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Backend connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the video backend (e.g., "http://localhost:8000").
    pub url: String,

    /// Basic auth user sent with every media request.
    pub username: String,

    /// Basic auth password sent with every media request.
    pub password: String,

    /// Connect timeout for media requests. `None` keeps the client default.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            connect_timeout_secs: None,
        }
    }
}

/// Streaming session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Route the WebSocket gateway is mounted on.
    pub ws_path: String,

    /// Largest payload carried by one packet of a continuous stream.
    pub chunk_size: usize,

    /// Capacity of the per-connection packet queue (backpressure bound).
    pub packet_queue_capacity: usize,

    /// Keep snapshot (image/jpeg) sessions registered until explicitly
    /// stopped instead of releasing them right after delivery.
    pub hold_snapshot_sessions: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_path: "/ws".to_string(),
            chunk_size: 1 << 20,
            packet_queue_capacity: 16,
            hold_snapshot_sessions: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
