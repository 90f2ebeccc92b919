//! Task execution: the FIFO work queue and the runner that drains it.

mod runner;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub use runner::{TaskRunner, WorkDirs};

#[derive(Error, Debug)]
#[error("Task queue is closed")]
pub struct QueueClosed;

/// Submission side of the work queue.
///
/// One bounded channel feeding one consumer keeps execution in strict
/// submission order; a full channel applies backpressure to submitters.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Uuid>,
}

impl TaskQueue {
    /// Hand a created task to the runner.
    pub async fn push(&self, task_id: Uuid) -> Result<(), QueueClosed> {
        self.tx.send(task_id).await.map_err(|_| QueueClosed)?;
        debug!(task_id = %task_id, "Task enqueued");
        Ok(())
    }

    /// False once the runner has stopped receiving.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Create the work queue and the receiver for the runner.
pub fn task_queue(capacity: usize) -> (TaskQueue, mpsc::Receiver<Uuid>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TaskQueue { tx }, rx)
}
