//! Range-serving interceptor
//!
//! Answers reads of a stored payload as if it came from a file server:
//! the full payload, or exactly the slice a single-range `Range` header asks
//! for. Works purely against the local database.
//!
//! Range handling is advisory. Any header this server does not understand
//! (several ranges, the suffix form, reversed or out-of-payload bounds,
//! garbage) is treated as absent and the full payload is served.

use crate::db::TrackStore;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Recorded type that says nothing about the payload
const GENERIC_MEDIA_TYPE: &str = "application/octet-stream";

/// Used when neither the record nor the file name gives a type
pub const FALLBACK_CONTENT_TYPE: &str = "audio/mpeg";

/// Content type from the file extension, case-insensitive
fn content_type_for_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        "opus" => "audio/opus",
        _ => return None,
    };
    Some(content_type)
}

/// Whether the folder importer should pick up `name`
pub fn is_audio_file(name: &str) -> bool {
    content_type_for_extension(name).is_some()
}

/// Recorded type, else extension lookup, else MPEG audio
pub fn resolve_content_type(media_type: Option<&str>, name: &str) -> String {
    match media_type.map(str::trim) {
        Some(recorded) if !recorded.is_empty() && !recorded.eq_ignore_ascii_case(GENERIC_MEDIA_TYPE) => {
            recorded.to_string()
        }
        _ => content_type_for_extension(name)
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string(),
    }
}

/// Parse `bytes=start-end` against a payload of `total` bytes
///
/// A missing end means "to the last byte", and an end past the payload is
/// clamped to it. Returns the inclusive `(start, end)` pair, or `None` when
/// the header should be ignored.
pub fn parse_range_header(range_header: Option<&str>, total: u64) -> Option<(u64, u64)> {
    let value = range_header?.trim();
    let ranges = value.strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }

    let (start_raw, end_raw) = ranges.split_once('-')?;
    let start_raw = start_raw.trim();
    if start_raw.is_empty() {
        return None;
    }
    let start = start_raw.parse::<u64>().ok()?;

    let last = total.checked_sub(1)?;
    let end = match end_raw.trim() {
        "" => last,
        raw => raw.parse::<u64>().ok()?.min(last),
    };

    if start > end {
        return None;
    }
    Some((start, end))
}

/// A payload ready to be written to the wire
#[derive(Debug, Clone, PartialEq)]
pub struct ServedMedia {
    pub content_type: String,
    pub total_len: u64,
    /// Inclusive byte range for a partial response
    pub range: Option<(u64, u64)>,
    /// Empty for HEAD requests
    pub body: Vec<u8>,
}

impl ServedMedia {
    pub fn is_partial(&self) -> bool {
        self.range.is_some()
    }

    /// Bytes this response covers (the `Content-Length`)
    pub fn content_length(&self) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => self.total_len,
        }
    }

    /// `bytes start-end/total` for partial responses
    pub fn content_range(&self) -> Option<String> {
        self.range
            .map(|(start, end)| format!("bytes {}-{}/{}", start, end, self.total_len))
    }
}

/// Serve track `id`, honouring a single-range `Range` header
///
/// With `head_only` the headers are computed but no payload is read.
pub async fn serve_track(
    store: &TrackStore,
    id: i64,
    range_header: Option<&str>,
    head_only: bool,
) -> Result<ServedMedia> {
    let info = store.content_info(id).await?;
    if info.total_len == 0 {
        return Err(Error::Corrupt(format!("track {} has an empty payload", id)));
    }

    let content_type = resolve_content_type(info.media_type.as_deref(), &info.name);
    let range = parse_range_header(range_header, info.total_len);

    if range.is_none() {
        if let Some(raw) = range_header {
            warn!("Ignoring unusable Range header {:?} for track {}", raw, id);
        }
    }

    let mut served = ServedMedia {
        content_type,
        total_len: info.total_len,
        range,
        body: Vec::new(),
    };

    if !head_only {
        let start = range.map_or(0, |(start, _)| start);
        served.body = store.read_range(id, start, served.content_length()).await?;
    }

    debug!(
        "Serving track {} ({}, {} of {} bytes)",
        id,
        served.content_type,
        served.content_length(),
        served.total_len
    );
    Ok(served)
}
