//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → websocket.rs (gateway route: upgrade, per-connection sessions)
//!     → proxy.rs (every other path: forward to backend)
//! ```

pub mod proxy;
pub mod server;
pub mod websocket;

pub use server::{AppState, GatewayServer, ServerError};
