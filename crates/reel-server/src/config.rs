//! Configuration file parsing for the server.
//!
//! Loads settings from TOML files including bind address, work directory,
//! streaming chunk size, reaper policy and the renderer command.

use reel_janitor::ReaperConfig;
use reel_store::DEFAULT_CHUNK_SIZE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Server configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// Field present but out of range
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Server configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1")
    pub bind_address: String,

    /// Bind port (e.g., 8080)
    pub bind_port: u16,

    /// Directory holding uploads and rendered artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Transfer segment size in bytes (default: 8192)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Largest accepted upload body in bytes (default: 512 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Log filter used when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Delete untracked files left in `work_dir` on shutdown (default: true)
    #[serde(default = "default_clean_residual_files")]
    pub clean_residual_files: bool,

    /// Eviction and deletion policy
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// External renderer invocation
    pub renderer: RendererConfig,
}

/// Renderer command configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    /// Program to execute
    pub program: String,

    /// Arguments; `{input}`, `{output}` and `{params}` are substituted
    #[serde(default = "default_renderer_args")]
    pub args: Vec<String>,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_clean_residual_files() -> bool {
    true
}

fn default_renderer_args() -> Vec<String> {
    ["--input", "{input}", "--output", "{output}", "--params", "{params}"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.program.is_empty() {
            return Err(ConfigError::MissingField("renderer.program".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than zero".to_string()));
        }
        self.reaper
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Create a default configuration for testing
    ///
    /// The renderer copies its input, which makes every upload its own
    /// rendered output.
    pub fn default_test_config() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 8080,
            work_dir: default_work_dir(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: default_max_upload_bytes(),
            log_level: default_log_level(),
            clean_residual_files: true,
            reaper: ReaperConfig::default(),
            renderer: RendererConfig {
                program: "cp".to_string(),
                args: vec!["{input}".to_string(), "{output}".to_string()],
            },
        }
    }

    /// Get the full bind address (address:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }
}
