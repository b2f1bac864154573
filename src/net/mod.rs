//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake)
//!     → HTTP layer (upgrade or proxy)
//!     → connection.rs (tracking for upgraded WebSocket connections)
//! ```
//!
//! # Design Decisions
//! - Each WebSocket connection is tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod connection;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
