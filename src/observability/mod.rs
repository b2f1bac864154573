//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, per-session spans)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID and session ID appear as span fields, not in messages
//! - Metric updates go through the `metrics` facade and are no-ops until an
//!   exporter is installed

pub mod logging;
pub mod metrics;
