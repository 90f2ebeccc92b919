//! API utility functions
//!
//! Pure, stateless helper functions for HTTP request processing and
//! result serving. Extracted from services.rs to enable unit testing
//! and reusability across handlers.

use uuid::Uuid;

use crate::api::error::ApiError;
use crate::tasks::{FormatDetails, Task};

const MAX_FILENAME_TITLE_CHARS: usize = 100;

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `application/json-patch+json`
/// - `text/json`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Makes a title safe to embed in a Content-Disposition filename.
///
/// Strips filesystem-reserved and control characters, trims whitespace,
/// and caps the length. An empty result falls back to `media`.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .take(MAX_FILENAME_TITLE_CHARS)
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Human-readable quality tag for a format, e.g. `720p` or `128kbps`.
pub fn quality_label(format: &FormatDetails) -> String {
    if let Some(height) = format.height {
        format!("{}p", height)
    } else if let Some(abr) = format.abr {
        format!("{}kbps", abr.round() as u64)
    } else {
        format.ext.clone()
    }
}

/// First eight hex digits of the id, enough to tell artifacts apart.
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Filename offered to the browser when serving a result.
pub fn result_filename(task: &Task, ext: &str) -> String {
    format!(
        "{} ({}) [{}].{}",
        sanitize_title(task.request.title()),
        quality_label(task.request.primary_format()),
        short_id(&task.id),
        ext
    )
}

/// Content type for a served artifact, by container extension.
pub fn content_type_for(ext: &str) -> mime::Mime {
    let raw = match ext {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "3gp" => "video/3gpp",
        "flv" => "video/x-flv",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    raw.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
