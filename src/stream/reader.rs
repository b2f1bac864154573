//! Stream readers turning backend responses into packets.
//!
//! # Responsibilities
//! - Multipart: one packet per part, stamped with the part's original time
//! - Continuous: one packet per body chunk (bounded size), unstamped
//! - Snapshot: the whole body as a single packet
//!
//! # Contract
//! `next()` yields `Ok(Some(packet))` until the body is exhausted
//! (`Ok(None)`) or unreadable (`Err`). Callers stop at the first non-packet
//! result and never call `next()` again.

use bytes::Bytes;
use reqwest::Response;
use thiserror::Error;

use crate::stream::multipart::{MultipartError, MultipartParser, Step};
use crate::stream::packet::EndpointPrefix;
use crate::stream::timestamp::{parse_original_time, NO_TIME, ORIGINAL_TIME_HEADER};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("reading backend body: {0}")]
    Body(#[from] reqwest::Error),

    #[error("multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

/// Packet producer over one backend response.
pub enum StreamReader {
    Multipart(MultipartReader),
    Continuous(ContinuousReader),
}

impl StreamReader {
    pub fn multipart(response: Response, boundary: &str, prefix: EndpointPrefix) -> Self {
        tracing::debug!(boundary = %boundary, "Reading multipart stream");
        Self::Multipart(MultipartReader {
            response,
            parser: MultipartParser::new(boundary),
            prefix,
        })
    }

    pub fn continuous(response: Response, chunk_size: usize, prefix: EndpointPrefix) -> Self {
        tracing::debug!(chunk_size, "Reading continuous stream");
        Self::Continuous(ContinuousReader {
            response,
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            prefix,
        })
    }

    /// Produce the next framed packet.
    pub async fn next(&mut self) -> Result<Option<Bytes>, StreamError> {
        match self {
            Self::Multipart(reader) => reader.next().await,
            Self::Continuous(reader) => reader.next().await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Multipart(_) => "multipart",
            Self::Continuous(_) => "continuous",
        }
    }
}

/// One packet per multipart part.
pub struct MultipartReader {
    response: Response,
    parser: MultipartParser,
    prefix: EndpointPrefix,
}

impl MultipartReader {
    async fn next(&mut self) -> Result<Option<Bytes>, StreamError> {
        loop {
            match self.parser.next_part()? {
                Step::Part(part) => {
                    let timestamp = part
                        .headers
                        .get(ORIGINAL_TIME_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map_or(NO_TIME, parse_original_time);
                    return Ok(Some(self.prefix.frame(timestamp, &part.body)));
                }
                Step::Finished => return Ok(None),
                Step::NeedMore => match self.response.chunk().await? {
                    Some(chunk) => self.parser.feed(&chunk),
                    None => {
                        self.parser.finish()?;
                        return Ok(None);
                    }
                },
            }
        }
    }
}

/// Bounded chunks of a continuous body.
pub struct ContinuousReader {
    response: Response,
    pending: Bytes,
    chunk_size: usize,
    prefix: EndpointPrefix,
}

impl ContinuousReader {
    async fn next(&mut self) -> Result<Option<Bytes>, StreamError> {
        while self.pending.is_empty() {
            match self.response.chunk().await? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(None),
            }
        }

        let take = self.chunk_size.min(self.pending.len());
        let chunk = self.pending.split_to(take);
        tracing::trace!(bytes = chunk.len(), "Read chunk");
        Ok(Some(self.prefix.frame(NO_TIME, &chunk)))
    }
}

/// Read a whole single-frame body, stamped with the request's original time.
pub async fn read_snapshot(
    response: Response,
    prefix: &EndpointPrefix,
    original_time: &str,
) -> Result<Bytes, StreamError> {
    let body = response.bytes().await?;
    tracing::debug!(bytes = body.len(), "Read snapshot body");
    Ok(prefix.frame(parse_original_time(original_time), &body))
}
