use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

/// Task engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Scratch space for in-flight tasks
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Where finished artifacts are published and served from
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Backpressure bound on the submission queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            artifact_dir: default_artifact_dir(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("data/work")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("data/artifacts")
}

fn default_queue_capacity() -> usize {
    64
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// How long finished artifacts stay on disk
    #[serde(default = "default_artifact_ttl")]
    pub artifact_ttl: HumanDuration,
    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: HumanDuration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            artifact_ttl: default_artifact_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_artifact_ttl() -> HumanDuration {
    HumanDuration::from_secs(24 * 60 * 60) // 24 hours
}

fn default_sweep_interval() -> HumanDuration {
    HumanDuration::from_secs(15 * 60) // 15 minutes
}

/// External tool binaries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ytdlp_bin")]
    pub ytdlp_bin: String,
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: default_ytdlp_bin(),
            ffmpeg_bin: default_ffmpeg_bin(),
        }
    }
}

fn default_ytdlp_bin() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

/// Status polling client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Poll interval while the task is still queued
    #[serde(default = "default_queued_poll_interval")]
    pub queued_poll_interval: HumanDuration,
    /// Poll interval once the task is processing
    #[serde(default = "default_processing_poll_interval")]
    pub processing_poll_interval: HumanDuration,
    /// Give up after this many polls without a terminal status
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queued_poll_interval: default_queued_poll_interval(),
            processing_poll_interval: default_processing_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_queued_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_processing_poll_interval() -> HumanDuration {
    HumanDuration(std::time::Duration::from_millis(500))
}

fn default_max_attempts() -> u32 {
    240
}
