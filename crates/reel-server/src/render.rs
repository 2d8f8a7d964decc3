//! Renderer seam and effect parameters
//!
//! The effect itself is an external program. The server only knows how to
//! hand it an input path, an output path and a parameter bundle, and how to
//! tell whether it produced something.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Rendering error
#[derive(Debug, Error)]
pub enum RenderError {
    /// Parameter bundle rejected before rendering
    #[error("Invalid render parameters: {0}")]
    InvalidParams(String),

    /// Renderer program could not be started
    #[error("Failed to start renderer: {0}")]
    Spawn(#[from] io::Error),

    /// Renderer exited unsuccessfully
    #[error("Renderer exited with {status}: {stderr}")]
    Failed {
        /// Exit status description
        status: String,
        /// Captured standard error (trimmed)
        stderr: String,
    },

    /// Renderer reported success but wrote nothing
    #[error("Renderer produced no output at {0}")]
    MissingOutput(PathBuf),

    /// Blocking render task panicked or was cancelled
    #[error("Render task aborted: {0}")]
    Aborted(String),
}

/// Effect parameters accepted by `/process`
///
/// Every field has a default, so `{}` is a valid bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    /// Output frame rate; `None` keeps the source rate
    pub fps: Option<f64>,
    /// Frames a tracked point stays alive
    pub life_frames: u32,
    /// Points spawned per beat
    pub pts_per_beat: u32,
    /// Ambient spawn rate between beats
    pub ambient_rate: f64,
    /// Positional jitter in pixels
    pub jitter_px: f64,
    /// Smallest marker size in pixels
    pub min_size: u32,
    /// Largest marker size in pixels
    pub max_size: u32,
    /// Links drawn to nearest neighbours
    pub neighbor_links: u32,
    /// ORB FAST corner threshold
    pub orb_fast_threshold: u32,
    /// Width of the beat envelope
    pub bell_width: f64,
    /// RNG seed; `None` draws a fresh one
    pub seed: Option<u64>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            fps: None,
            life_frames: 10,
            pts_per_beat: 20,
            ambient_rate: 5.0,
            jitter_px: 0.5,
            min_size: 15,
            max_size: 40,
            neighbor_links: 3,
            orb_fast_threshold: 20,
            bell_width: 4.0,
            seed: None,
        }
    }
}

impl RenderParams {
    /// Reject bundles the renderer cannot honour
    pub fn validate(&self) -> Result<(), RenderError> {
        if let Some(fps) = self.fps {
            if !(fps > 0.0 && fps.is_finite()) {
                return Err(RenderError::InvalidParams(format!("fps must be positive, got {fps}")));
            }
        }
        if self.min_size > self.max_size {
            return Err(RenderError::InvalidParams(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.life_frames == 0 {
            return Err(RenderError::InvalidParams("life_frames must be at least 1".into()));
        }
        for (name, value) in [
            ("ambient_rate", self.ambient_rate),
            ("jitter_px", self.jitter_px),
            ("bell_width", self.bell_width),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(RenderError::InvalidParams(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Black-box video effect
///
/// Implementations block; callers run them on the blocking pool.
pub trait Renderer: Send + Sync {
    /// Produce `output` from `input`, or fail
    fn render(&self, input: &Path, output: &Path, params: &RenderParams) -> Result<(), RenderError>;
}

/// Runs an external program as the renderer
///
/// Arguments may contain the placeholders `{input}`, `{output}` and
/// `{params}` (the bundle as JSON).
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Create a renderer invoking `program` with templated `args`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Expand placeholders for one invocation
    pub fn expand_args(&self, input: &Path, output: &Path, params: &RenderParams) -> Vec<String> {
        let params_json = serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{params}", &params_json)
            })
            .collect()
    }
}

impl Renderer for CommandRenderer {
    fn render(&self, input: &Path, output: &Path, params: &RenderParams) -> Result<(), RenderError> {
        params.validate()?;

        let args = self.expand_args(input, output, params);
        tracing::debug!(program = %self.program.display(), ?args, "Invoking renderer");

        let result = Command::new(&self.program).args(&args).output()?;
        if !result.status.success() {
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.is_file() {
            return Err(RenderError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}
