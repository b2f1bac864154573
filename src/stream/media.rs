//! Media type classification.
//!
//! # Responsibilities
//! - Parse the backend's `Content-Type` header
//! - Map it to the reader that understands the payload shape
//!
//! # Mapping
//! ```text
//! multipart/x-mixed-replace  → Multipart (one timestamped frame per part)
//! image/jpeg                 → Snapshot  (whole body, one frame)
//! video/mp4                  → Continuous (untimed chunks)
//! anything else              → unsupported, session fails
//! ```

use thiserror::Error;

pub const MULTIPART_MIXED_REPLACE: &str = "multipart/x-mixed-replace";
pub const IMAGE_JPEG: &str = "image/jpeg";
pub const VIDEO_MP4: &str = "video/mp4";

/// Payload shape of a backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Multipart { boundary: String },
    Snapshot,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("response has no content type")]
    Missing,

    #[error("malformed content type `{0}`")]
    Malformed(String),

    #[error("multipart response without boundary")]
    MissingBoundary,

    #[error("unsupported content type `{0}`")]
    Unsupported(String),
}

/// Classify a `Content-Type` header value.
pub fn classify(content_type: &str) -> Result<MediaKind, MediaError> {
    let mut fields = content_type.split(';');
    let essence = fields.next().unwrap_or_default().trim().to_ascii_lowercase();
    if essence.is_empty() {
        return Err(MediaError::Missing);
    }
    match essence.split_once('/') {
        Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() => {}
        _ => return Err(MediaError::Malformed(content_type.to_string())),
    }

    match essence.as_str() {
        MULTIPART_MIXED_REPLACE => {
            let boundary = fields
                .filter_map(|param| param.split_once('='))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
                .map(|(_, value)| value.trim().trim_matches('"').to_string())
                .filter(|boundary| !boundary.is_empty())
                .ok_or(MediaError::MissingBoundary)?;
            Ok(MediaKind::Multipart { boundary })
        }
        IMAGE_JPEG => Ok(MediaKind::Snapshot),
        VIDEO_MP4 => Ok(MediaKind::Continuous),
        _ => Err(MediaError::Unsupported(essence)),
    }
}
