use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::{ConvertSpec, FetchSpec, MediaProbe, MuxSpec};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} failed: {detail}")]
    Failed { tool: String, detail: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unreadable tool output: {0}")]
    Output(String),

    #[error("Tool io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Within-operation progress callback, percent in [0, 100].
///
/// Invocations must stay cheap: executors call this from the line reader
/// of a live subprocess, so the callback only folds the value into the
/// store and returns.
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Boundary to the external download and transcode tools.
///
/// Every operation that spawns a subprocess takes a cancellation token;
/// when it fires, the implementation kills the whole process tree, reaps
/// it, and returns `ToolError::Cancelled`.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Inspect a URL and return its metadata and categorized formats.
    async fn probe(&self, url: &str) -> Result<MediaProbe>;

    /// Fetch one stream to `spec.dest`, reporting percent as it goes.
    async fn fetch(
        &self,
        spec: FetchSpec,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Merge a video and an audio file into `spec.dest`.
    async fn mux(
        &self,
        spec: MuxSpec,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Rewrite a fetched file into another container.
    async fn convert(&self, spec: ConvertSpec, cancel: CancellationToken) -> Result<()>;
}
