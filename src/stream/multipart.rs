//! Incremental `multipart/x-mixed-replace` parser.
//!
//! # Responsibilities
//! - Split a boundary-delimited body into parts as bytes arrive
//! - Parse each part's header block
//! - Detect the closing delimiter
//!
//! # Body Layout
//! ```text
//! [preamble]
//! --boundary CRLF
//! Header: value CRLF
//! CRLF
//! <part body> CRLF
//! --boundary CRLF
//! ...
//! --boundary-- [epilogue]
//! ```
//!
//! # Design Decisions
//! - Push parser: `feed` bytes, pull parts with `next_part`
//! - Bare LF line endings are accepted alongside CRLF
//! - Already scanned body bytes are not scanned again while waiting for input

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::{Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("malformed part header line `{0}`")]
    Header(String),

    #[error("body ended inside a part")]
    UnexpectedEof,
}

/// One fully buffered part.
#[derive(Debug, Clone)]
pub struct Part {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Result of one parse step.
#[derive(Debug)]
pub enum Step {
    /// A complete part.
    Part(Part),
    /// More input is needed before the next part can be produced.
    NeedMore,
    /// The closing delimiter was seen.
    Finished,
}

#[derive(Debug)]
enum State {
    /// Looking for a delimiter line.
    Delimiter,
    /// Reading a part's header block.
    Headers(HeaderMap),
    /// Reading a part's body; `scanned` bytes are known delimiter-free.
    Body { headers: HeaderMap, scanned: usize },
    Finished,
}

/// Push parser for one multipart body.
#[derive(Debug)]
pub struct MultipartParser {
    /// `--boundary`
    dash_boundary: Vec<u8>,
    buf: BytesMut,
    state: State,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            dash_boundary,
            buf: BytesMut::new(),
            state: State::Delimiter,
        }
    }

    /// Append received body bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Produce the next part if the buffered input allows it.
    pub fn next_part(&mut self) -> Result<Step, MultipartError> {
        loop {
            match std::mem::replace(&mut self.state, State::Finished) {
                State::Finished => return Ok(Step::Finished),
                State::Delimiter => match self.take_line() {
                    None if self.is_close_delimiter(trim_line(&self.buf)) => {
                        return Ok(Step::Finished);
                    }
                    None => {
                        self.state = State::Delimiter;
                        return Ok(Step::NeedMore);
                    }
                    Some(line) => {
                        let line = trim_line(&line);
                        if line == self.dash_boundary.as_slice() {
                            self.state = State::Headers(HeaderMap::new());
                        } else if self.is_close_delimiter(line) {
                            return Ok(Step::Finished);
                        } else {
                            // preamble or padding
                            self.state = State::Delimiter;
                        }
                    }
                },
                State::Headers(mut headers) => match self.take_line() {
                    None => {
                        self.state = State::Headers(headers);
                        return Ok(Step::NeedMore);
                    }
                    Some(line) => {
                        let line = trim_line(&line);
                        if line.is_empty() {
                            self.state = State::Body { headers, scanned: 0 };
                        } else {
                            let (name, value) = parse_header(line)?;
                            headers.append(name, value);
                            self.state = State::Headers(headers);
                        }
                    }
                },
                State::Body { headers, scanned } => match self.find_delimiter(scanned) {
                    Delimiter::Found { body_end, next_start } => {
                        let body = self.buf.split_to(body_end).freeze();
                        let _ = self.buf.split_to(next_start - body_end);
                        self.state = State::Delimiter;
                        return Ok(Step::Part(Part { headers, body }));
                    }
                    Delimiter::Pending { scanned } => {
                        self.state = State::Body { headers, scanned };
                        return Ok(Step::NeedMore);
                    }
                },
            }
        }
    }

    /// Called once the input is exhausted.
    ///
    /// Reaching the end without a closing delimiter is accepted only between
    /// parts; a truncated part is an error.
    pub fn finish(&self) -> Result<(), MultipartError> {
        match &self.state {
            State::Finished => Ok(()),
            State::Delimiter if trim_line(&self.buf).is_empty() => Ok(()),
            State::Delimiter if self.is_close_delimiter(trim_line(&self.buf)) => Ok(()),
            _ => Err(MultipartError::UnexpectedEof),
        }
    }

    fn is_close_delimiter(&self, line: &[u8]) -> bool {
        line.len() == self.dash_boundary.len() + 2
            && line.starts_with(&self.dash_boundary)
            && line.ends_with(b"--")
    }

    /// Remove and return one line including its terminator.
    fn take_line(&mut self) -> Option<BytesMut> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        Some(self.buf.split_to(end + 1))
    }

    /// Look for `LF--boundary` followed by `--`, whitespace or a line end.
    fn find_delimiter(&self, scanned: usize) -> Delimiter {
        let needle_len = self.dash_boundary.len() + 1;
        let mut from = scanned;

        while let Some(at) = find(&self.buf[from..], b'\n', &self.dash_boundary).map(|i| i + from) {
            let after = at + needle_len;
            let Some(next) = self.buf.get(after) else {
                return Delimiter::Pending { scanned: at };
            };
            let is_delimiter = match next {
                b'-' => match self.buf.get(after + 1) {
                    Some(b'-') => true,
                    Some(_) => false,
                    None => return Delimiter::Pending { scanned: at },
                },
                b'\r' | b'\n' | b' ' | b'\t' => true,
                _ => false,
            };
            if is_delimiter {
                let body_end = if at > 0 && self.buf[at - 1] == b'\r' { at - 1 } else { at };
                return Delimiter::Found {
                    body_end,
                    next_start: at + 1,
                };
            }
            from = at + 1;
        }

        // A delimiter may straddle the end of the buffer; keep the tail unscanned.
        let scanned = self.buf.len().saturating_sub(needle_len).max(scanned);
        Delimiter::Pending { scanned }
    }
}

enum Delimiter {
    Found { body_end: usize, next_start: usize },
    Pending { scanned: usize },
}

/// Find `lead` immediately followed by `rest`.
fn find(haystack: &[u8], lead: u8, rest: &[u8]) -> Option<usize> {
    haystack
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == lead)
        .map(|(i, _)| i)
        .find(|i| haystack[i + 1..].starts_with(rest) || rest.starts_with(&haystack[i + 1..]))
}

fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn parse_header(line: &[u8]) -> Result<(HeaderName, HeaderValue), MultipartError> {
    let malformed = || MultipartError::Header(String::from_utf8_lossy(line).into_owned());
    let colon = line.iter().position(|b| *b == b':').ok_or_else(malformed)?;
    let name = HeaderName::from_bytes(trim_line(&line[..colon])).map_err(|_| malformed())?;
    let value = trim_start(&line[colon + 1..]);
    let value = HeaderValue::from_bytes(value).map_err(|_| malformed())?;
    Ok((name, value))
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t'))
        .unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = b"preamble\r\n\
--frame\r\n\
Content-Type: image/jpeg\r\n\
X-Video-Original-Time: 20240102T030405.000001\r\n\
\r\n\
first\r\n\
--frame\r\n\
Content-Type: image/jpeg\r\n\
\r\n\
second\r\n--frameless text\r\n\
--frame--\r\n";

    fn collect(parser: &mut MultipartParser) -> (Vec<Part>, bool) {
        let mut parts = Vec::new();
        loop {
            match parser.next_part().unwrap() {
                Step::Part(part) => parts.push(part),
                Step::NeedMore => return (parts, false),
                Step::Finished => return (parts, true),
            }
        }
    }

    #[test]
    fn parses_whole_body() {
        let mut parser = MultipartParser::new("frame");
        parser.feed(BODY);
        let (parts, finished) = collect(&mut parser);

        assert!(finished);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body.as_ref(), b"first");
        assert_eq!(
            parts[0].headers.get("x-video-original-time").unwrap(),
            "20240102T030405.000001"
        );
        assert_eq!(parts[1].body.as_ref(), b"second\r\n--frameless text");
        assert!(parts[1].headers.get("x-video-original-time").is_none());
        assert_eq!(parser.finish(), Ok(()));
    }

    #[test]
    fn byte_at_a_time_matches_whole_body() {
        let mut parser = MultipartParser::new("frame");
        let mut parts = Vec::new();
        let mut finished = false;
        for byte in BODY {
            parser.feed(std::slice::from_ref(byte));
            let (mut more, done) = collect(&mut parser);
            parts.append(&mut more);
            if done {
                finished = true;
                break;
            }
        }

        assert!(finished);
        let bodies: Vec<_> = parts.iter().map(|p| p.body.clone()).collect();
        assert_eq!(bodies, vec![&b"first"[..], &b"second\r\n--frameless text"[..]]);
    }

    #[test]
    fn bare_lf_line_endings() {
        let mut parser = MultipartParser::new("b");
        parser.feed(b"--b\nX-Video-Original-Time: 20240102T030405\n\nabc\n--b\n\nxyz\n--b--");
        let (parts, finished) = collect(&mut parser);
        assert!(finished);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body.as_ref(), b"abc");
        assert_eq!(parts[1].body.as_ref(), b"xyz");
    }

    #[test]
    fn open_ended_stream_waits_for_next_delimiter() {
        let mut parser = MultipartParser::new("frame");
        parser.feed(b"--frame\r\n\r\nlive-1\r\n--frame\r\n\r\nlive-2");
        let (parts, finished) = collect(&mut parser);
        assert!(!finished);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body.as_ref(), b"live-1");
        assert_eq!(parser.finish(), Err(MultipartError::UnexpectedEof));

        parser.feed(b"\r\n--frame\r\n");
        let (parts, _) = collect(&mut parser);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body.as_ref(), b"live-2");
    }

    #[test]
    fn eof_inside_part_is_error() {
        let mut parser = MultipartParser::new("frame");
        parser.feed(b"--frame\r\n\r\nonly\r\n--frame\r\n");
        let (parts, finished) = collect(&mut parser);
        assert!(!finished);
        assert_eq!(parts.len(), 1);
        // The delimiter opened a part whose headers never arrived.
        assert_eq!(parser.finish(), Err(MultipartError::UnexpectedEof));

        let mut parser = MultipartParser::new("frame");
        parser.feed(b"--frame\r\n\r\nonly\r\n");
        let (parts, _) = collect(&mut parser);
        assert!(parts.is_empty());
        assert_eq!(parser.finish(), Err(MultipartError::UnexpectedEof));
    }

    #[test]
    fn malformed_header_is_error() {
        let mut parser = MultipartParser::new("frame");
        parser.feed(b"--frame\r\nno colon here\r\n\r\nbody\r\n--frame--");
        assert!(matches!(parser.next_part(), Err(MultipartError::Header(_))));
    }

    #[test]
    fn empty_body_finishes_cleanly() {
        let mut parser = MultipartParser::new("frame");
        assert!(matches!(parser.next_part(), Ok(Step::NeedMore)));
        assert_eq!(parser.finish(), Ok(()));
    }
}
