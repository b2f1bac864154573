//! Per-connection session management.
//!
//! # Data Flow
//! ```text
//! WebSocket read half
//!     → dispatcher.rs (decode command)
//!         → command.rs (validate, build backend URL)
//!         → registry.rs (start / stop / replace)
//!             → pull.rs (one task per session)
//!                 → backend.rs (authenticated GET)
//!                 → stream::* (classify, read, frame)
//!                 → packet queue
//!     → multiplexer.rs (drain queue)
//! WebSocket write half
//! ```
//!
//! # Design Decisions
//! - Sessions never write to the socket; the multiplexer is its only writer
//! - Stop state travels with each queued packet so stale packets are dropped
//! - Everything here is scoped to one connection and torn down with it

pub mod backend;
pub mod cancel;
pub mod command;
pub mod dispatcher;
pub mod multiplexer;
pub mod pull;
pub mod registry;

pub use backend::{BackendError, BackendTarget};
pub use cancel::{stop_signal, StopFlag, StopSignal, StopTrigger};
pub use command::{Action, Command, CommandError, Method, PlayRequest, Source};
pub use multiplexer::MultiplexerExit;
pub use pull::{Outbound, PullContext, PullOutcome};
pub use registry::{SessionRegistry, SessionTask};
