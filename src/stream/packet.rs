//! Binary packet framing.
//!
//! # Wire Format
//! ```text
//! ┌──────┬──────┬────────────────┬─────────────────────┬───────────────┐
//! │ 0x00 │  L   │ endpoint (L B) │ timestamp (u64, BE) │ payload ...   │
//! └──────┴──────┴────────────────┴─────────────────────┴───────────────┘
//! ```
//! The first two bytes are the endpoint length as a big-endian u16 whose
//! high byte is always zero. A timestamp of [`NO_TIME`] means the original
//! capture time is unknown.
//!
//! # Design Decisions
//! - Framing is pure; every packet owns its own buffer
//! - The endpoint prefix is built once per session and reused per packet
//! - Endpoint names over 255 bytes are rejected before a session starts

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub use crate::stream::timestamp::NO_TIME;

/// Longest endpoint name that fits the one-byte length field.
pub const MAX_ENDPOINT_LEN: usize = u8::MAX as usize;

const LENGTH_FIELD: usize = 2;
const TIMESTAMP_FIELD: usize = 8;

/// Errors raised while building or parsing packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("endpoint name is {0} bytes, at most {MAX_ENDPOINT_LEN} allowed")]
    EndpointTooLong(usize),

    #[error("packet truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unexpected marker byte {0:#04x}")]
    Marker(u8),

    #[error("endpoint name is not valid UTF-8")]
    Endpoint,
}

/// Pre-built `[0][L][endpoint]` header shared by all packets of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPrefix(Bytes);

impl EndpointPrefix {
    /// Build the prefix for an endpoint name.
    pub fn new(endpoint: &str) -> Result<Self, PacketError> {
        let len = endpoint.len();
        if len > MAX_ENDPOINT_LEN {
            return Err(PacketError::EndpointTooLong(len));
        }

        let mut buf = BytesMut::with_capacity(LENGTH_FIELD + len);
        buf.put_u16(len as u16);
        buf.put_slice(endpoint.as_bytes());
        Ok(Self(buf.freeze()))
    }

    /// Frame a payload behind this prefix.
    pub fn frame(&self, timestamp: u64, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.0.len() + TIMESTAMP_FIELD + payload.len());
        buf.put_slice(&self.0);
        buf.put_u64(timestamp);
        buf.put_slice(payload);
        buf.freeze()
    }
}

/// Build one packet.
///
/// # Panics
/// If `endpoint` is longer than [`MAX_ENDPOINT_LEN`] bytes.
pub fn frame(endpoint: &str, timestamp: u64, payload: &[u8]) -> Bytes {
    match EndpointPrefix::new(endpoint) {
        Ok(prefix) => prefix.frame(timestamp, payload),
        Err(e) => panic!("{}", e),
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub endpoint: String,
    pub timestamp: u64,
    pub payload: Bytes,
}

impl Packet {
    /// Parse a framed packet.
    pub fn parse(mut data: Bytes) -> Result<Self, PacketError> {
        ensure(&data, LENGTH_FIELD)?;
        let marker = data.get_u8();
        if marker != 0 {
            return Err(PacketError::Marker(marker));
        }
        let len = data.get_u8() as usize;

        ensure(&data, len + TIMESTAMP_FIELD)?;
        let endpoint = data.split_to(len);
        let endpoint = std::str::from_utf8(&endpoint)
            .map_err(|_| PacketError::Endpoint)?
            .to_string();
        let timestamp = data.get_u64();

        Ok(Self {
            endpoint,
            timestamp,
            payload: data,
        })
    }
}

fn ensure(data: &Bytes, needed: usize) -> Result<(), PacketError> {
    if data.remaining() < needed {
        return Err(PacketError::Truncated {
            needed,
            available: data.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        let pkt = frame("cam1", 0x0102_0304_0506_0708, b"jpeg");
        assert_eq!(
            pkt.as_ref(),
            &[
                0, 4, b'c', b'a', b'm', b'1', 1, 2, 3, 4, 5, 6, 7, 8, b'j', b'p', b'e', b'g'
            ][..]
        );
    }

    #[test]
    fn parse_recovers_fields() {
        for (endpoint, ts, payload) in [
            ("cam1", NO_TIME, &b"frame"[..]),
            ("", 1_700_000_000_000, &b""[..]),
            ("площадь/вход", u64::MAX, &[0u8, 255, 7][..]),
        ] {
            let parsed = Packet::parse(frame(endpoint, ts, payload)).unwrap();
            assert_eq!(parsed.endpoint, endpoint);
            assert_eq!(parsed.timestamp, ts);
            assert_eq!(parsed.payload.as_ref(), payload);
        }
    }

    #[test]
    fn longest_endpoint_fits() {
        let endpoint = "e".repeat(MAX_ENDPOINT_LEN);
        let parsed = Packet::parse(frame(&endpoint, 42, b"x")).unwrap();
        assert_eq!(parsed.endpoint.len(), MAX_ENDPOINT_LEN);
        assert_eq!(parsed.timestamp, 42);
    }

    #[test]
    fn prefix_rejects_long_endpoint() {
        let endpoint = "e".repeat(MAX_ENDPOINT_LEN + 1);
        assert_eq!(
            EndpointPrefix::new(&endpoint),
            Err(PacketError::EndpointTooLong(MAX_ENDPOINT_LEN + 1))
        );
    }

    #[test]
    #[should_panic(expected = "endpoint name is 256 bytes")]
    fn frame_panics_on_long_endpoint() {
        frame(&"e".repeat(256), 0, b"");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(matches!(
            Packet::parse(Bytes::from_static(&[0])),
            Err(PacketError::Truncated { .. })
        ));
        assert_eq!(
            Packet::parse(Bytes::from_static(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0])),
            Err(PacketError::Marker(1))
        );
        assert!(matches!(
            Packet::parse(Bytes::from_static(&[0, 4, b'c', b'a', 0, 0])),
            Err(PacketError::Truncated { .. })
        ));
        assert_eq!(
            Packet::parse(Bytes::from_static(&[0, 1, 0xff, 0, 0, 0, 0, 0, 0, 0, 0])),
            Err(PacketError::Endpoint)
        );
    }
}
