use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::progress::{self, ProgressEvent};
use super::types::{CancelOutcome, Task, TaskPhase, TaskRequest, TaskStatus};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// In-memory task registry, the single source of truth for task state.
///
/// Architecture:
/// - one std mutex around a `Uuid -> Task` map; every critical section is a
///   short field update and is never held across an await point
/// - readers get owned snapshots, never references into the map
/// - exactly one worker drives status/phase/progress for a given task;
///   other actors only read or set the cancel flag
/// - a cancellation token is created per task so executors can be
///   interrupted mid-subprocess
///
/// The registry is process-local. A second process gets a disjoint task
/// universe, so scaling means more capacity within one process, not more
/// processes behind a load balancer.
pub struct TaskStore {
    inner: Mutex<HashMap<Uuid, TaskEntry>>,
}

struct TaskEntry {
    task: Task,
    cancel: CancellationToken,
}

impl TaskStore {
    pub fn new() -> Self {
        TaskStore {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, TaskEntry>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, id: &Uuid, apply: impl FnOnce(&mut Task)) -> Result<()> {
        let mut map = self.lock();
        let entry = map.get_mut(id).ok_or(TaskError::NotFound(*id))?;
        apply(&mut entry.task);
        Ok(())
    }

    /// Register a new task in `queued` and return its id.
    pub fn create(&self, request: TaskRequest) -> Uuid {
        let task = Task::new(request);
        let id = task.id;
        debug!(task_id = %id, kind = %task.kind, "Task created");
        self.lock().insert(
            id,
            TaskEntry {
                task,
                cancel: CancellationToken::new(),
            },
        );
        id
    }

    /// Snapshot of a task's current state.
    pub fn get(&self, id: &Uuid) -> Option<Task> {
        self.lock().get(id).map(|entry| entry.task.clone())
    }

    /// Token fired when cancellation is requested for this task.
    pub fn cancellation_token(&self, id: &Uuid) -> Option<CancellationToken> {
        self.lock().get(id).map(|entry| entry.cancel.clone())
    }

    /// Flag a task for cancellation and fire its token.
    ///
    /// The status itself does not change here; the worker performs the
    /// transition at its next checkpoint. Terminal tasks are left alone.
    pub fn request_cancel(&self, id: &Uuid) -> Result<CancelOutcome> {
        let mut map = self.lock();
        let entry = map.get_mut(id).ok_or(TaskError::NotFound(*id))?;
        if entry.task.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        entry.task.cancel_requested = true;
        entry.cancel.cancel();
        debug!(task_id = %id, "Cancellation flagged");
        Ok(CancelOutcome::Accepted)
    }

    /// Move a queued task into `processing` with its first phase.
    pub fn begin(&self, id: &Uuid, phase: TaskPhase) -> Result<()> {
        self.update(id, |task| {
            if task.status == TaskStatus::Queued {
                task.status = TaskStatus::Processing;
                task.phase = phase;
                task.progress_percent = 0.0;
            }
        })
    }

    /// Enter the next phase, resetting percent to zero.
    pub fn advance_phase(&self, id: &Uuid, phase: TaskPhase) -> Result<()> {
        self.update(id, |task| {
            if task.status == TaskStatus::Processing {
                task.phase = phase;
                task.progress_percent = 0.0;
            }
        })
    }

    /// Switch the phase label while keeping the current percent.
    ///
    /// Used for stages with no usable progress signal of their own, which
    /// hold the previous phase's final percent instead of snapping to zero.
    pub fn relabel_phase(&self, id: &Uuid, phase: TaskPhase) -> Result<()> {
        self.update(id, |task| {
            if task.status == TaskStatus::Processing {
                task.phase = phase;
            }
        })
    }

    /// Fold a progress event into the task, dropping stale or regressive ones.
    pub fn record_progress(&self, id: &Uuid, event: ProgressEvent) -> Result<()> {
        self.update(id, |task| {
            if task.status != TaskStatus::Processing {
                return;
            }
            if let Some(percent) = progress::merge(&task.phase, task.progress_percent, &event) {
                task.progress_percent = percent;
            }
        })
    }

    /// Terminal transition: the task produced an artifact.
    pub fn complete(&self, id: &Uuid, result_ref: PathBuf) -> Result<()> {
        self.update(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.status = TaskStatus::Completed;
            task.progress_percent = 100.0;
            task.result_ref = Some(result_ref);
            task.completed_at = Some(Utc::now());
        })
    }

    /// Terminal transition: the task failed with a diagnostic message.
    pub fn fail(&self, id: &Uuid, message: String) -> Result<()> {
        self.update(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.status = TaskStatus::Failed;
            task.message = if message.is_empty() {
                "unspecified failure".to_string()
            } else {
                message
            };
            task.completed_at = Some(Utc::now());
        })
    }

    /// Terminal transition: the task was cancelled before finishing.
    pub fn mark_cancelled(&self, id: &Uuid, message: &str) -> Result<()> {
        self.update(id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.status = TaskStatus::Cancelled;
            task.message = message.to_string();
            task.completed_at = Some(Utc::now());
        })
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
