//! Backend media interpretation subsystem.
//!
//! # Data Flow
//! ```text
//! backend response
//!     → media.rs (Content-Type → payload shape)
//!     → reader.rs (multipart / continuous / snapshot)
//!         → multipart.rs (part splitting)
//!         → timestamp.rs (original time → packet time)
//!     → packet.rs (binary framing)
//!     → framed packet bytes
//! ```
//!
//! # Design Decisions
//! - Classification is one pure function; a new payload shape touches one match
//! - Readers own their response; dropping a reader aborts the transfer
//! - Framing never fails once the endpoint prefix is built

pub mod media;
pub mod multipart;
pub mod packet;
pub mod reader;
pub mod timestamp;

pub use media::{classify, MediaError, MediaKind};
pub use packet::{frame, EndpointPrefix, Packet, PacketError, MAX_ENDPOINT_LEN};
pub use reader::{read_snapshot, StreamError, StreamReader};
pub use timestamp::{parse_original_time, NO_TIME, ORIGINAL_TIME_HEADER};
