//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_connections_active` (gauge): open client connections
//! - `gateway_sessions_started_total` (counter)
//! - `gateway_sessions_ended_total` (counter): by outcome
//! - `gateway_packets_total` (counter): packets written to clients
//! - `gateway_packet_bytes_total` (counter): bytes written to clients
//! - `gateway_commands_rejected_total` (counter): by reason
//! - `gateway_proxy_requests_total` (counter): by status
//! - `gateway_proxy_request_duration_seconds` (histogram)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened() {
    metrics::gauge!("gateway_connections_active").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("gateway_connections_active").decrement(1.0);
}

pub fn record_session_started() {
    metrics::counter!("gateway_sessions_started_total").increment(1);
}

pub fn record_session_ended(outcome: &'static str) {
    metrics::counter!("gateway_sessions_ended_total", "outcome" => outcome).increment(1);
}

pub fn record_packet(bytes: usize) {
    metrics::counter!("gateway_packets_total").increment(1);
    metrics::counter!("gateway_packet_bytes_total").increment(bytes as u64);
}

pub fn record_command_rejected(reason: &'static str) {
    metrics::counter!("gateway_commands_rejected_total", "reason" => reason).increment(1);
}

pub fn record_proxy_request(status: u16, started: Instant) {
    metrics::counter!("gateway_proxy_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("gateway_proxy_request_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}
