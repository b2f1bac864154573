//! Original-time parsing.
//!
//! The backend stamps media with `YYYYMMDDThhmmss[.ffffff]` (UTC). Packets
//! carry the value as milliseconds, biased by [`EPOCH_OFFSET`].

use chrono::NaiveDateTime;

/// Sentinel timestamp meaning "original time unknown".
pub const NO_TIME: u64 = 0;

/// Offset between the Unix epoch and the packet epoch, in milliseconds.
/// Packet time is `unix_ms - EPOCH_OFFSET`.
pub const EPOCH_OFFSET: i64 = -2_208_988_800_000;

/// Header carrying the original capture time, on requests and on multipart parts.
pub const ORIGINAL_TIME_HEADER: &str = "X-Video-Original-Time";

const ORIGINAL_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.f";

/// Convert an original-time string to a packet timestamp.
///
/// Empty, unparseable and pre-1900 values map to [`NO_TIME`].
pub fn parse_original_time(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() {
        return NO_TIME;
    }

    match NaiveDateTime::parse_from_str(text, ORIGINAL_TIME_FORMAT) {
        Ok(time) => {
            let millis = time.and_utc().timestamp_millis() - EPOCH_OFFSET;
            match u64::try_from(millis).ok().filter(|ms| *ms > NO_TIME) {
                Some(ms) => ms,
                None => {
                    tracing::warn!(value = %text, "Original time before packet epoch");
                    NO_TIME
                }
            }
        }
        Err(e) => {
            tracing::warn!(value = %text, error = %e, "Unparseable original time");
            NO_TIME
        }
    }
}
