use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::mediatool::{ConvertSpec, FetchSpec, MediaTool, MuxSpec, ProgressFn, ToolError};
use crate::observability::Metrics;
use crate::tasks::{
    CombineRequest, DownloadRequest, ProgressEvent, TaskError, TaskPhase, TaskRequest, TaskStore,
};

#[derive(Error, Debug)]
enum RunError {
    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Tool(ToolError),

    #[error("Workspace error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] TaskError),
}

impl From<ToolError> for RunError {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::Cancelled => RunError::Cancelled,
            other => RunError::Tool(other),
        }
    }
}

/// Filesystem layout the runner works in.
///
/// Each task gets a private scratch directory under `work_dir` that is
/// removed whichever way the task ends; only published artifacts live in
/// `artifact_dir`, which is what the retention sweeper walks.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub work_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

impl WorkDirs {
    fn scratch_for(&self, task_id: &Uuid) -> PathBuf {
        self.work_dir.join(task_id.simple().to_string())
    }
}

/// Single consumer of the work queue.
///
/// Dequeues task ids in submission order and drives each task through its
/// phases. The runner is the only writer of task status, phase, and
/// progress; cancellation from other actors arrives as a flag plus a fired
/// token, honored at the dequeue checkpoint and at every phase boundary.
pub struct TaskRunner {
    store: Arc<TaskStore>,
    tool: Arc<dyn MediaTool>,
    dirs: WorkDirs,
    metrics: Arc<Metrics>,
}

impl TaskRunner {
    pub fn new(
        store: Arc<TaskStore>,
        tool: Arc<dyn MediaTool>,
        dirs: WorkDirs,
        metrics: Arc<Metrics>,
    ) -> Self {
        TaskRunner {
            store,
            tool,
            dirs,
            metrics,
        }
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(self, mut queue: mpsc::Receiver<Uuid>) {
        info!("Task runner started");
        while let Some(task_id) = queue.recv().await {
            self.run_task(task_id).await;
        }
        info!("Task queue closed, runner exiting");
    }

    async fn run_task(&self, task_id: Uuid) {
        let Some(task) = self.store.get(&task_id) else {
            warn!(task_id = %task_id, "Dequeued task has no record, skipping");
            return;
        };

        // Dequeue checkpoint: a task cancelled while queued never starts.
        if task.cancel_requested {
            if let Err(err) = self.store.mark_cancelled(&task_id, "cancelled before start") {
                warn!(task_id = %task_id, error = %err, "Failed to record cancellation");
            }
            self.metrics.task_cancelled();
            info!(task_id = %task_id, "Task cancelled before processing");
            return;
        }

        if let Err(err) = self.store.begin(&task_id, task.kind.first_phase()) {
            warn!(task_id = %task_id, error = %err, "Failed to start task");
            return;
        }
        info!(task_id = %task_id, kind = %task.kind, "Task processing started");

        let scratch = self.dirs.scratch_for(&task_id);
        let outcome = match fs::create_dir_all(&scratch).await {
            Ok(()) => match &task.request {
                TaskRequest::Download(request) => {
                    self.run_download(task_id, request, &scratch).await
                }
                TaskRequest::Combine(request) => self.run_combine(task_id, request, &scratch).await,
            },
            Err(err) => Err(RunError::Io(err)),
        };

        match outcome {
            Ok(artifact) => {
                if let Err(err) = self.store.complete(&task_id, artifact.clone()) {
                    warn!(task_id = %task_id, error = %err, "Failed to record completion");
                }
                self.metrics.task_completed();
                info!(task_id = %task_id, artifact = %artifact.display(), "Task completed");
            }
            Err(RunError::Cancelled) => {
                if let Err(err) = self.store.mark_cancelled(&task_id, "cancelled by request") {
                    warn!(task_id = %task_id, error = %err, "Failed to record cancellation");
                }
                self.metrics.task_cancelled();
                info!(task_id = %task_id, "Task cancelled during processing");
            }
            Err(err) => {
                if let Err(store_err) = self.store.fail(&task_id, err.to_string()) {
                    warn!(task_id = %task_id, error = %store_err, "Failed to record failure");
                }
                self.metrics.task_failed();
                error!(task_id = %task_id, error = %err, "Task failed");
            }
        }

        // Partial outputs live only in scratch, so this discards them all.
        if let Err(err) = fs::remove_dir_all(&scratch).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(scratch = %scratch.display(), error = %err, "Failed to clean scratch dir");
            }
        }
    }

    /// Download pipeline: `downloading`, then optionally `converting_{ext}`.
    async fn run_download(
        &self,
        task_id: Uuid,
        request: &DownloadRequest,
        scratch: &Path,
    ) -> Result<PathBuf, RunError> {
        let fetched = scratch.join(format!("media.{}", request.format.ext));
        self.fetch_phase(
            task_id,
            TaskPhase::Downloading,
            &request.url,
            &request.format_id,
            &fetched,
        )
        .await?;
        self.cancel_checkpoint(task_id)?;

        let (produced, ext) = match &request.format.convert_to {
            Some(target) if *target != request.format.ext => {
                // Conversion has no percent signal; the label switches while
                // progress holds at the download's final 100.
                self.store
                    .relabel_phase(&task_id, TaskPhase::Converting(target.clone()))?;
                let converted = scratch.join(format!("converted.{}", target));
                let cancel = self
                    .store
                    .cancellation_token(&task_id)
                    .ok_or(TaskError::NotFound(task_id))?;
                self.tool
                    .convert(
                        ConvertSpec {
                            input: fetched,
                            dest: converted.clone(),
                        },
                        cancel,
                    )
                    .await?;
                self.cancel_checkpoint(task_id)?;
                (converted, target.clone())
            }
            _ => (fetched, request.format.ext.clone()),
        };

        self.publish_artifact(task_id, &produced, &ext).await
    }

    /// Combine pipeline: `downloading_video`, `downloading_audio`, `combining`.
    async fn run_combine(
        &self,
        task_id: Uuid,
        request: &CombineRequest,
        scratch: &Path,
    ) -> Result<PathBuf, RunError> {
        let video = scratch.join(format!("video.{}", request.video_format.ext));
        self.fetch_phase(
            task_id,
            TaskPhase::DownloadingVideo,
            &request.url,
            &request.video_format.format_id,
            &video,
        )
        .await?;
        self.cancel_checkpoint(task_id)?;

        self.store
            .advance_phase(&task_id, TaskPhase::DownloadingAudio)?;
        let audio = scratch.join(format!("audio.{}", request.audio_format.ext));
        self.fetch_phase(
            task_id,
            TaskPhase::DownloadingAudio,
            &request.url,
            &request.audio_format.format_id,
            &audio,
        )
        .await?;
        self.cancel_checkpoint(task_id)?;

        self.store.advance_phase(&task_id, TaskPhase::Combining)?;
        let merged = scratch.join("combined.mp4");
        let cancel = self
            .store
            .cancellation_token(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;
        self.tool
            .mux(
                MuxSpec {
                    video,
                    audio,
                    dest: merged.clone(),
                    duration_secs: request.duration_secs,
                },
                self.progress_sink(task_id, TaskPhase::Combining),
                cancel,
            )
            .await?;
        self.cancel_checkpoint(task_id)?;

        self.publish_artifact(task_id, &merged, "mp4").await
    }

    /// Fetch one stream under the given phase, pinning percent to 100 at the end.
    async fn fetch_phase(
        &self,
        task_id: Uuid,
        phase: TaskPhase,
        url: &str,
        format_id: &str,
        dest: &Path,
    ) -> Result<(), RunError> {
        let cancel = self
            .store
            .cancellation_token(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;
        self.tool
            .fetch(
                FetchSpec {
                    url: url.to_string(),
                    format_id: format_id.to_string(),
                    dest: dest.to_path_buf(),
                },
                self.progress_sink(task_id, phase.clone()),
                cancel,
            )
            .await?;
        self.store
            .record_progress(&task_id, ProgressEvent::new(phase, 100.0))?;
        Ok(())
    }

    /// Callback handed across the tool boundary for one phase.
    fn progress_sink(&self, task_id: Uuid, phase: TaskPhase) -> ProgressFn {
        let store = self.store.clone();
        Arc::new(move |percent| {
            let event = ProgressEvent::new(phase.clone(), percent);
            let _ = store.record_progress(&task_id, event);
        })
    }

    fn cancel_checkpoint(&self, task_id: Uuid) -> Result<(), RunError> {
        match self.store.get(&task_id) {
            Some(task) if task.cancel_requested => Err(RunError::Cancelled),
            Some(_) => Ok(()),
            None => Err(TaskError::NotFound(task_id).into()),
        }
    }

    /// Move a finished file out of scratch into the artifact directory.
    async fn publish_artifact(
        &self,
        task_id: Uuid,
        produced: &Path,
        ext: &str,
    ) -> Result<PathBuf, RunError> {
        let dest = self
            .dirs
            .artifact_dir
            .join(format!("{}.{}", task_id.simple(), ext));
        match fs::rename(produced, &dest).await {
            Ok(()) => {}
            // Rename fails across filesystem boundaries; fall back to a copy.
            Err(_) => {
                fs::copy(produced, &dest).await?;
                let _ = fs::remove_file(produced).await;
            }
        }
        Ok(dest)
    }
}
