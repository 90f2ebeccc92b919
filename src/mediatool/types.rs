use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inputs for fetching a single stream to a local file.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub url: String,
    pub format_id: String,
    pub dest: PathBuf,
}

/// Inputs for merging separate video and audio files.
#[derive(Debug, Clone)]
pub struct MuxSpec {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub dest: PathBuf,
    /// Source duration in seconds, used to turn elapsed output time into percent
    pub duration_secs: Option<f64>,
}

/// Inputs for rewriting a file into another container.
#[derive(Debug, Clone)]
pub struct ConvertSpec {
    pub input: PathBuf,
    pub dest: PathBuf,
}

/// Metadata returned by a probe, with formats already categorized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaProbe {
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
    pub uploader: Option<String>,
    pub formats: FormatCatalog,
}

/// Probe formats bucketed by what a client can do with them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatCatalog {
    /// Ready-to-play formats carrying both video and audio
    pub combined: Vec<FormatOption>,
    /// Video-only streams, one per resolution, capped to the top three
    pub video_only: Vec<FormatOption>,
    /// Audio-only streams
    pub audio_only: Vec<FormatOption>,
    /// Everything that fits no other bucket
    pub other: Vec<FormatOption>,
}

/// One selectable format in a probe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatOption {
    pub format_id: String,
    pub ext: String,
    /// Display tag, "1080p" for video and "128kbps" for audio
    pub quality: String,
    pub height: Option<u32>,
    pub abr: Option<f64>,
    /// Human-readable size, absent when the probe does not know it
    pub filesize: Option<String>,
}
