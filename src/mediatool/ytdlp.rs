//! Command construction and output parsing for the yt-dlp subprocess.

use std::collections::HashMap;

use serde::Deserialize;
use tokio::process::Command;

use super::traits::{Result, ToolError};
use super::types::{FetchSpec, FormatCatalog, FormatOption, MediaProbe};
use crate::humanize::format_size;

/// Legacy format ids that bundle audio even when the metadata says otherwise.
const COMBINED_FORMAT_IDS: &[&str] = &[
    "17", "18", "22", "36", "37", "38", "43", "44", "45", "46", "59", "78", "82", "83", "84", "85",
];

/// Video-only entries surfaced per probe, one per resolution.
const MAX_VIDEO_ONLY: usize = 3;

pub(crate) fn probe_command(bin: &str, url: &str) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-J").arg("--no-playlist").arg("--").arg(url);
    cmd
}

pub(crate) fn fetch_command(bin: &str, spec: &FetchSpec) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-f")
        .arg(&spec.format_id)
        .arg("--newline")
        .arg("--progress")
        .arg("--no-playlist")
        .arg("-o")
        .arg(&spec.dest)
        .arg("--")
        .arg(&spec.url);
    cmd
}

/// Extract percent from a `--newline --progress` status line.
///
/// Lines look like `[download]  42.7% of 10.66MiB at 2.04MiB/s ETA 00:04`;
/// anything else on stdout yields `None`.
pub(crate) fn parse_progress(line: &str) -> Option<f32> {
    let rest = line.strip_prefix("[download]")?;
    let token = rest.split_whitespace().find(|token| token.ends_with('%'))?;
    token
        .trim_end_matches('%')
        .parse::<f32>()
        .ok()
        .filter(|percent| percent.is_finite())
}

/// Subset of one entry in the `-J` formats array.
#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: String,
    #[serde(default)]
    ext: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProbeJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

pub(crate) fn parse_probe(stdout: &[u8]) -> Result<MediaProbe> {
    let raw: ProbeJson = serde_json::from_slice(stdout)
        .map_err(|error| ToolError::Output(format!("metadata JSON: {}", error)))?;
    Ok(MediaProbe {
        title: raw.title,
        duration_secs: raw.duration,
        uploader: raw.uploader,
        formats: classify_formats(raw.formats),
    })
}

impl RawFormat {
    fn is_noise(&self) -> bool {
        self.url.as_deref().unwrap_or("").is_empty()
            || self.format_note.as_deref() == Some("storyboard")
            || self.protocol.as_deref() == Some("m3u8_native")
            || self.ext == "mhtml"
    }

    fn has_video(&self) -> bool {
        self.height.is_some_and(|height| height > 0)
    }

    fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(codec) if codec != "none")
    }

    fn is_legacy_combined(&self) -> bool {
        COMBINED_FORMAT_IDS.contains(&self.format_id.as_str())
    }

    fn into_option(self) -> FormatOption {
        let quality = if self.has_video() {
            format!("{}p", self.height.unwrap_or(0))
        } else if let Some(abr) = self.abr {
            format!("{}kbps", abr.round() as u64)
        } else if self.has_audio() {
            "audio".to_string()
        } else {
            self.format_note.clone().unwrap_or_else(|| "unknown".to_string())
        };
        FormatOption {
            format_id: self.format_id,
            ext: self.ext,
            quality,
            height: self.height,
            abr: self.abr,
            filesize: self.filesize.map(format_size),
        }
    }
}

/// Bucket probe formats the way clients consume them.
///
/// Combined and video buckets sort by height descending, audio by bitrate
/// descending. Video-only keeps one entry per resolution, mp4 preferred
/// over other containers, capped to the top resolutions.
fn classify_formats(raw: Vec<RawFormat>) -> FormatCatalog {
    let mut combined = Vec::new();
    let mut video_only = Vec::new();
    let mut audio_only = Vec::new();
    let mut other = Vec::new();

    for format in raw {
        if format.is_noise() {
            continue;
        }
        if format.has_video() && (format.has_audio() || format.is_legacy_combined()) {
            combined.push(format.into_option());
        } else if format.has_video() {
            video_only.push(format.into_option());
        } else if format.abr.is_some() || format.has_audio() {
            audio_only.push(format.into_option());
        } else {
            other.push(format.into_option());
        }
    }

    combined.sort_by_key(|option| std::cmp::Reverse(option.height.unwrap_or(0)));
    video_only.sort_by_key(|option| std::cmp::Reverse(option.height.unwrap_or(0)));
    audio_only.sort_by_key(|option| {
        std::cmp::Reverse(option.abr.map(|abr| abr.round() as u64).unwrap_or(0))
    });

    FormatCatalog {
        combined,
        video_only: dedup_resolutions(video_only),
        audio_only,
        other,
    }
}

fn dedup_resolutions(sorted: Vec<FormatOption>) -> Vec<FormatOption> {
    let mut by_height: HashMap<u32, FormatOption> = HashMap::new();
    let mut heights = Vec::new();
    for option in sorted {
        let Some(height) = option.height else { continue };
        match by_height.get(&height) {
            None => {
                heights.push(height);
                by_height.insert(height, option);
            }
            Some(existing) if existing.ext != "mp4" && option.ext == "mp4" => {
                by_height.insert(height, option);
            }
            Some(_) => {}
        }
    }
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights
        .into_iter()
        .take(MAX_VIDEO_ONLY)
        .filter_map(|height| by_height.remove(&height))
        .collect()
}
