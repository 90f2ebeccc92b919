//! Configuration management for MediaBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mediabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MEDIABOX__<section>__<key>`
//!
//! Examples:
//! - `MEDIABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MEDIABOX__RETENTION__ARTIFACT_TTL=12h`
//! - `MEDIABOX__TOOLS__YTDLP_BIN=/usr/local/bin/yt-dlp`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mediabox.toml`.
//! This can be overridden using the `MEDIABOX_CONFIG` environment variable.

mod models;
mod sources;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{
    ClientConfig, Config, EngineConfig, RetentionConfig, ServerConfig, ToolsConfig,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MEDIABOX__*`)
    /// 2. TOML file (default: `config/mediabox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        Ok(config)
    }
}
