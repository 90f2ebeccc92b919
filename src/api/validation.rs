use thiserror::Error;

use super::models::ProbeRequest;
use crate::tasks::{CombineRequest, DownloadRequest, FormatDetails};

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("url must start with http:// or https://")]
    InvalidUrl,
    #[error("extension '{0}' must be 1-8 alphanumeric characters")]
    InvalidExtension(String),
    #[error("duration_secs must be a positive number")]
    InvalidDuration,
}

pub fn validate_probe(request: &ProbeRequest) -> Result<(), RequestValidationError> {
    validate_url(&request.url)
}

pub fn validate_download(request: &DownloadRequest) -> Result<(), RequestValidationError> {
    validate_url(&request.url)?;

    if request.format_id.is_empty() {
        return Err(RequestValidationError::EmptyField("format_id"));
    }

    validate_extension(&request.format.ext)?;
    if let Some(target) = &request.format.convert_to {
        validate_extension(target)?;
    }

    Ok(())
}

pub fn validate_combine(request: &CombineRequest) -> Result<(), RequestValidationError> {
    validate_url(&request.url)?;
    validate_stream(&request.video_format, "video_format.format_id")?;
    validate_stream(&request.audio_format, "audio_format.format_id")?;

    if let Some(duration) = request.duration_secs {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(RequestValidationError::InvalidDuration);
        }
    }

    Ok(())
}

fn validate_stream(
    format: &FormatDetails,
    field: &'static str,
) -> Result<(), RequestValidationError> {
    if format.format_id.is_empty() {
        return Err(RequestValidationError::EmptyField(field));
    }
    validate_extension(&format.ext)
}

fn validate_url(url: &str) -> Result<(), RequestValidationError> {
    if url.is_empty() {
        return Err(RequestValidationError::EmptyField("url"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(RequestValidationError::InvalidUrl);
    }
    Ok(())
}

// Extensions are spliced into filesystem paths, so the charset is strict.
fn validate_extension(ext: &str) -> Result<(), RequestValidationError> {
    let valid = !ext.is_empty()
        && ext.len() <= 8
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(RequestValidationError::InvalidExtension(ext.to_string()));
    }
    Ok(())
}
