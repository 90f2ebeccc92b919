//! Scripted in-process stand-in for the external tools, used by tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::traits::{MediaTool, ProgressFn, Result, ToolError};
use super::types::{ConvertSpec, FetchSpec, MediaProbe, MuxSpec};

/// Behavior of one tool invocation, consumed in submission order.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Report these percents in order, then produce the destination file
    Progress(Vec<f32>),
    /// Fail with the given detail message
    Fail(String),
    /// Park until the cancellation token fires
    BlockUntilCancelled,
}

/// `MediaTool` whose fetch/mux/convert calls play back a fixed script.
///
/// Each call pops the next step; running past the end of the script acts
/// like an instant success with no progress reports.
pub struct ScriptedTool {
    steps: Mutex<VecDeque<ScriptStep>>,
    probe: MediaProbe,
}

impl ScriptedTool {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        ScriptedTool {
            steps: Mutex::new(steps.into()),
            probe: MediaProbe::default(),
        }
    }

    pub fn with_probe(mut self, probe: MediaProbe) -> Self {
        self.probe = probe;
        self
    }

    fn next_step(&self) -> ScriptStep {
        let mut steps = self.steps.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        steps.pop_front().unwrap_or(ScriptStep::Progress(Vec::new()))
    }

    async fn run_step(
        &self,
        dest: &Path,
        progress: Option<&ProgressFn>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.next_step() {
            ScriptStep::Progress(percents) => {
                for percent in percents {
                    if let Some(report) = progress {
                        report(percent);
                    }
                    tokio::task::yield_now().await;
                }
                tokio::fs::write(dest, b"scripted media").await?;
                Ok(())
            }
            ScriptStep::Fail(detail) => Err(ToolError::Failed {
                tool: "scripted".to_string(),
                detail,
            }),
            ScriptStep::BlockUntilCancelled => {
                cancel.cancelled().await;
                Err(ToolError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl MediaTool for ScriptedTool {
    async fn probe(&self, _url: &str) -> Result<MediaProbe> {
        Ok(self.probe.clone())
    }

    async fn fetch(
        &self,
        spec: FetchSpec,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.run_step(&spec.dest, Some(&progress), &cancel).await
    }

    async fn mux(
        &self,
        spec: MuxSpec,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.run_step(&spec.dest, Some(&progress), &cancel).await
    }

    async fn convert(&self, spec: ConvertSpec, cancel: CancellationToken) -> Result<()> {
        self.run_step(&spec.dest, None, &cancel).await
    }
}
