//! API models for MediaBox submission and status endpoints.
//!
//! This module defines the data structures used in MediaBox's external API contract:
//! - Format discovery via `POST /api/probe` returns a [`crate::mediatool::MediaProbe`]
//! - Task submission via `POST /api/tasks/download` and `POST /api/tasks/combine`
//!   accepts the request payloads from [`crate::tasks`] and returns a
//!   [`TaskAcceptedResponse`]
//! - Status polling via `GET /api/tasks/{task_id}` returns a [`TaskStatusResponse`]
//!
//! # Submission Structure
//!
//! A combine submission example (as JSON):
//!
//! ```json
//! {
//!   "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!   "title": "Never Gonna Give You Up",
//!   "duration_secs": 213.0,
//!   "video_format": { "format_id": "137", "ext": "mp4", "height": 1080 },
//!   "audio_format": { "format_id": "140", "ext": "m4a", "abr": 129.5 }
//! }
//! ```
//!
//! And the status payload clients poll for:
//!
//! ```json
//! {
//!   "task_id": "0190b2f0-5e1a-7cc3-a617-6c51e1adfb49",
//!   "kind": "combine",
//!   "status": "processing",
//!   "phase": "downloading_audio",
//!   "progress_percent": 42.5,
//!   "message": "",
//!   "title": "Never Gonna Give You Up",
//!   "created_at": 1714557600,
//!   "completed_at": null,
//!   "result_ready": false
//! }
//! ```
//!
//! # Key Concepts
//!
//! - **Task**: One submission; identified by a time-sortable UUIDv7 `task_id`
//! - **Phase**: Pipeline stage label, flat strings such as `downloading_video`
//!   or `converting_mp3`
//! - **Result**: Finished artifact, fetched from `GET /api/tasks/{task_id}/result`
//!   once `result_ready` is true

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::observability::MetricsSnapshot;
use crate::tasks::{CancelOutcome, Task, TaskKind, TaskPhase, TaskStatus};

/// Format discovery request.
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskAcceptedResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    /// Relative URL the client polls for status updates
    pub status_url: String,
}

impl TaskAcceptedResponse {
    pub fn queued(task_id: Uuid) -> Self {
        TaskAcceptedResponse {
            task_id,
            status: TaskStatus::Queued,
            status_url: format!("/api/tasks/{}", task_id),
        }
    }
}

/// Point-in-time view of a task, shaped for polling clients.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub phase: TaskPhase,
    pub progress_percent: f32,
    /// Failure or cancellation detail, empty otherwise
    pub message: String,
    pub title: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result_ready: bool,
}

impl From<&Task> for TaskStatusResponse {
    fn from(task: &Task) -> Self {
        TaskStatusResponse {
            task_id: task.id,
            kind: task.kind,
            status: task.status,
            phase: task.phase.clone(),
            progress_percent: task.progress_percent,
            message: task.message.clone(),
            title: task.request.title().to_string(),
            created_at: task.created_at,
            completed_at: task.completed_at,
            result_ready: task.status == TaskStatus::Completed && task.result_ref.is_some(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancelResponse {
    pub task_id: Uuid,
    pub outcome: CancelOutcome,
    /// Status after the request was applied
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
