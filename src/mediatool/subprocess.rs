use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::process;
use super::traits::{MediaTool, ProgressFn, Result, ToolError};
use super::types::{ConvertSpec, FetchSpec, MediaProbe, MuxSpec};
use super::{ffmpeg, ytdlp};
use crate::config::ToolsConfig;

/// Production `MediaTool` backed by the yt-dlp and ffmpeg binaries.
pub struct SubprocessTool {
    ytdlp_bin: String,
    ffmpeg_bin: String,
}

impl SubprocessTool {
    pub fn new(tools: &ToolsConfig) -> Self {
        SubprocessTool {
            ytdlp_bin: tools.ytdlp_bin.clone(),
            ffmpeg_bin: tools.ffmpeg_bin.clone(),
        }
    }
}

#[async_trait]
impl MediaTool for SubprocessTool {
    async fn probe(&self, url: &str) -> Result<MediaProbe> {
        debug!(url, "Probing media metadata");
        let output = ytdlp::probe_command(&self.ytdlp_bin, url)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: self.ytdlp_bin.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.ytdlp_bin.clone(),
                detail: process::stderr_excerpt(&output.stderr),
            });
        }
        ytdlp::parse_probe(&output.stdout)
    }

    async fn fetch(
        &self,
        spec: FetchSpec,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()> {
        debug!(url = %spec.url, format_id = %spec.format_id, dest = %spec.dest.display(), "Fetching stream");
        let mut cmd = ytdlp::fetch_command(&self.ytdlp_bin, &spec);
        let child = process::spawn(&self.ytdlp_bin, &mut cmd)?;
        process::run_streaming(&self.ytdlp_bin, child, &cancel, |line| {
            if let Some(percent) = ytdlp::parse_progress(line) {
                progress(percent);
            }
        })
        .await
    }

    async fn mux(
        &self,
        spec: MuxSpec,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<()> {
        debug!(dest = %spec.dest.display(), "Combining video and audio streams");
        let duration = spec.duration_secs;
        let mut cmd = ffmpeg::mux_command(&self.ffmpeg_bin, &spec);
        let child = process::spawn(&self.ffmpeg_bin, &mut cmd)?;
        process::run_streaming(&self.ffmpeg_bin, child, &cancel, |line| {
            if let Some(percent) = ffmpeg::parse_progress(line, duration) {
                progress(percent);
            }
        })
        .await
    }

    async fn convert(&self, spec: ConvertSpec, cancel: CancellationToken) -> Result<()> {
        debug!(input = %spec.input.display(), dest = %spec.dest.display(), "Converting container");
        let mut cmd = ffmpeg::convert_command(&self.ffmpeg_bin, &spec);
        let child = process::spawn(&self.ffmpeg_bin, &mut cmd)?;
        process::run_streaming(&self.ffmpeg_bin, child, &cancel, |_line| {}).await
    }
}
