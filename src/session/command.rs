//! Client commands and backend request construction.
//!
//! # Wire Format
//! One JSON object per WebSocket message:
//! ```text
//! {"Method":"play","StreamId":"s1","Endpoint":"cam1","Format":"mjpeg",
//!  "BeginTime":"20240102T030405","Archive":"main","Speed":2,
//!  "Width":640,"Height":480,"Q":80}
//! ```
//! Every field is optional on the wire. An empty `BeginTime` selects the live
//! source, anything else the archive.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::stream::MAX_ENDPOINT_LEN;

/// Format that carries `w`, `h` and `vc` query parameters.
pub const SNAPSHOT_FORMAT: &str = "jpeg";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Json(#[from] serde_json::Error),

    #[error("command has no method")]
    MissingMethod,

    #[error("play command needs a {0}")]
    MissingField(&'static str),

    #[error("endpoint name is {0} bytes, at most {MAX_ENDPOINT_LEN} allowed")]
    EndpointTooLong(usize),

    #[error("backend URL cannot carry media paths")]
    BackendUrl,
}

impl CommandError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CommandError::Json(_) => "json",
            CommandError::MissingMethod => "method",
            CommandError::MissingField(_) => "missing_field",
            CommandError::EndpointTooLong(_) => "endpoint_length",
            CommandError::BackendUrl => "backend_url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Play,
    Stop,
}

/// A command as received from the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Command {
    pub archive: String,
    pub method: Option<Method>,
    pub endpoint: String,
    pub begin_time: String,
    pub format: String,
    pub stream_id: String,
    pub speed: i64,
    pub width: i64,
    pub height: i64,
    pub q: i64,
}

/// What the dispatcher should do with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Play(PlayRequest),
    Stop { stream_id: String },
}

impl Command {
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Validate the command and turn it into an action.
    pub fn into_action(self) -> Result<Action, CommandError> {
        match self.method.ok_or(CommandError::MissingMethod)? {
            Method::Stop => Ok(Action::Stop {
                stream_id: self.stream_id,
            }),
            Method::Play => {
                if self.stream_id.is_empty() {
                    return Err(CommandError::MissingField("StreamId"));
                }
                if self.endpoint.is_empty() {
                    return Err(CommandError::MissingField("Endpoint"));
                }
                if self.endpoint.len() > MAX_ENDPOINT_LEN {
                    return Err(CommandError::EndpointTooLong(self.endpoint.len()));
                }
                Ok(Action::Play(PlayRequest {
                    stream_id: self.stream_id,
                    endpoint: self.endpoint,
                    format: self.format,
                    begin_time: Some(self.begin_time).filter(|t| !t.is_empty()),
                    archive: self.archive,
                    speed: self.speed,
                    width: self.width,
                    height: self.height,
                    quality: self.q,
                }))
            }
        }
    }
}

/// Backend media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Live,
    Archive,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Live => "live",
            Source::Archive => "archive",
        }
    }
}

/// A validated request to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub stream_id: String,
    pub endpoint: String,
    pub format: String,
    /// `None` for live playback.
    pub begin_time: Option<String>,
    pub archive: String,
    pub speed: i64,
    pub width: i64,
    pub height: i64,
    pub quality: i64,
}

impl PlayRequest {
    pub fn source(&self) -> Source {
        if self.begin_time.is_some() {
            Source::Archive
        } else {
            Source::Live
        }
    }

    /// Value sent as the original-time request header.
    pub fn original_time(&self) -> &str {
        self.begin_time.as_deref().unwrap_or_default()
    }

    /// Build `{base}/{live|archive}/media/{endpoint}[/{begin}]?format=...`.
    pub fn backend_url(&self, base: &Url) -> Result<Url, CommandError> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| CommandError::BackendUrl)?;
            // Endpoint ids are slash-separated paths on the backend.
            segments
                .pop_if_empty()
                .extend([self.source().as_str(), "media"])
                .extend(self.endpoint.split('/'));
            if let Some(begin_time) = &self.begin_time {
                segments.push(begin_time);
            }
        }

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", &self.format);
            if self.source() == Source::Archive && !self.archive.is_empty() {
                query.append_pair("archive", &self.archive);
            }
            if self.speed > 0 {
                query.append_pair("speed", &self.speed.to_string());
            }
            if self.format == SNAPSHOT_FORMAT {
                query.append_pair("w", &self.width.to_string());
                query.append_pair("h", &self.height.to_string());
                query.append_pair("vc", &self.quality.to_string());
            }
        }

        Ok(url)
    }
}
