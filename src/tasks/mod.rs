//! Task records, the in-memory store, and the progress protocol.

mod progress;
mod store;
mod types;

pub use progress::ProgressEvent;
pub use store::{Result, TaskError, TaskStore};
pub use types::{
    CancelOutcome, CombineRequest, DownloadRequest, FormatDetails, Task, TaskKind, TaskPhase,
    TaskRequest, TaskStatus,
};
