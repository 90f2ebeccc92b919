use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// What a task does with the media it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fetch a single stream, optionally converting the container afterwards
    Download,
    /// Fetch separate video and audio streams and combine them into one file
    Combine,
}

impl TaskKind {
    /// Phase a task of this kind enters when the worker picks it up.
    pub fn first_phase(&self) -> TaskPhase {
        match self {
            TaskKind::Download => TaskPhase::Downloading,
            TaskKind::Combine => TaskPhase::DownloadingVideo,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Download => write!(f, "download"),
            TaskKind::Combine => write!(f, "combine"),
        }
    }
}

/// Lifecycle state of a task.
///
/// Transitions only move forward: queued -> processing -> one of the three
/// terminal states. A terminal status never changes again, whichever
/// transition lands first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

/// Which stage of the pipeline a processing task is in.
///
/// Serialized as a flat label; conversion carries its target extension in
/// the label itself (for example `converting_mp3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPhase {
    None,
    Downloading,
    Converting(String),
    DownloadingVideo,
    DownloadingAudio,
    Combining,
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPhase::None => write!(f, "none"),
            TaskPhase::Downloading => write!(f, "downloading"),
            TaskPhase::Converting(ext) => write!(f, "converting_{}", ext),
            TaskPhase::DownloadingVideo => write!(f, "downloading_video"),
            TaskPhase::DownloadingAudio => write!(f, "downloading_audio"),
            TaskPhase::Combining => write!(f, "combining"),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown phase label: {0}")]
pub struct UnknownPhase(String);

impl FromStr for TaskPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TaskPhase::None),
            "downloading" => Ok(TaskPhase::Downloading),
            "downloading_video" => Ok(TaskPhase::DownloadingVideo),
            "downloading_audio" => Ok(TaskPhase::DownloadingAudio),
            "combining" => Ok(TaskPhase::Combining),
            other => match other.strip_prefix("converting_") {
                Some(ext) if !ext.is_empty() => Ok(TaskPhase::Converting(ext.to_string())),
                _ => Err(UnknownPhase(other.to_string())),
            },
        }
    }
}

impl Serialize for TaskPhase {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskPhase {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PhaseVisitor;

        impl serde::de::Visitor<'_> for PhaseVisitor {
            type Value = TaskPhase;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a phase label such as \"downloading\" or \"converting_mp3\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_str(PhaseVisitor)
    }
}

/// Stream selection details as reported by a probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatDetails {
    /// Tool-native format identifier, required for combine submissions
    #[serde(default)]
    pub format_id: String,
    /// Container extension of the selected stream
    pub ext: String,
    /// Video height in pixels, when the stream carries video
    #[serde(default)]
    pub height: Option<u32>,
    /// Audio bitrate in kbps, when the stream carries audio
    #[serde(default)]
    pub abr: Option<f64>,
    /// Convert the fetched file into this container after the download
    #[serde(default)]
    pub convert_to: Option<String>,
}

/// Submission payload for a single-stream download task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub format_id: String,
    pub format: FormatDetails,
    /// Display title, used for the served filename
    #[serde(default)]
    pub title: String,
}

/// Submission payload for a combine task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineRequest {
    pub url: String,
    pub video_format: FormatDetails,
    pub audio_format: FormatDetails,
    #[serde(default)]
    pub title: String,
    /// Source duration hint used to derive merge progress
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// Original submission parameters, retained on the task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskRequest {
    Download(DownloadRequest),
    Combine(CombineRequest),
}

impl TaskRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRequest::Download(_) => TaskKind::Download,
            TaskRequest::Combine(_) => TaskKind::Combine,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            TaskRequest::Download(req) => &req.title,
            TaskRequest::Combine(req) => &req.title,
        }
    }

    /// Format used for quality labelling, the video stream when there are two.
    pub fn primary_format(&self) -> &FormatDetails {
        match self {
            TaskRequest::Download(req) => &req.format,
            TaskRequest::Combine(req) => &req.video_format,
        }
    }
}

/// One tracked unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub phase: TaskPhase,
    pub progress_percent: f32,
    pub message: String,
    /// Location of the finished artifact, set only on completion
    pub result_ref: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub request: TaskRequest,
}

impl Task {
    pub fn new(request: TaskRequest) -> Self {
        Task {
            id: Uuid::now_v7(),
            kind: request.kind(),
            status: TaskStatus::Queued,
            phase: TaskPhase::None,
            progress_percent: 0.0,
            message: String::new(),
            result_ref: None,
            created_at: Utc::now(),
            completed_at: None,
            cancel_requested: false,
            request,
        }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The cancel flag was set; the worker will honor it at the next checkpoint
    Accepted,
    /// The task had already reached a terminal state and stays unchanged
    AlreadyTerminal,
}
