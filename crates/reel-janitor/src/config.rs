//! Configuration for Reaper operations
//!
//! Defines the artifact TTL, sweep interval and deletion retry policy.

use crate::JanitorError;
use reel_domain::DEFAULT_TTL_SECS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Reaper service
///
/// # Examples
///
/// ```
/// use reel_janitor::ReaperConfig;
///
/// let config = ReaperConfig::default();
/// assert_eq!(config.ttl_secs, 1800);
/// assert_eq!(config.deletion.max_attempts, 5);
///
/// let config = ReaperConfig::aggressive();
/// assert!(config.ttl_secs < 1800);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Maximum artifact age in seconds before eviction
    /// Default: 1800 (30 minutes)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How often the background worker sweeps (in seconds)
    /// Default: 60
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Dry-run mode: log what would be evicted without evicting
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Hand file deletion to a background queue instead of awaiting it
    /// Default: true
    #[serde(default = "default_background_deletion")]
    pub background_deletion: bool,

    /// Retry policy for backing-file deletion
    #[serde(default)]
    pub deletion: DeletionConfig,
}

/// Retry policy for [`SafeDeleter`](crate::SafeDeleter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionConfig {
    /// Total attempts before giving up
    /// Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait before the first retry (in milliseconds)
    /// Default: 1000
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the wait after each failed attempt
    /// Default: 1.5
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_background_deletion() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl DeletionConfig {
    /// Wait before the first retry as Duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for ReaperConfig {
    /// Balanced defaults
    ///
    /// - TTL: 30 minutes
    /// - Sweep interval: 1 minute
    /// - Deletion: 5 attempts, 1s initial delay, 1.5x backoff
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            dry_run: false,
            background_deletion: default_background_deletion(),
            deletion: DeletionConfig::default(),
        }
    }
}

impl ReaperConfig {
    /// Short retention for disk-constrained hosts
    ///
    /// - TTL: 10 minutes
    /// - Sweep interval: 15 seconds
    pub fn aggressive() -> Self {
        Self {
            ttl_secs: 600,
            sweep_interval_secs: 15,
            ..Self::default()
        }
    }

    /// Long retention for development
    ///
    /// - TTL: 2 hours
    /// - Sweep interval: 5 minutes
    pub fn lenient() -> Self {
        Self {
            ttl_secs: 7200,
            sweep_interval_secs: 300,
            ..Self::default()
        }
    }

    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject settings that would make the reaper misbehave
    pub fn validate(&self) -> Result<(), JanitorError> {
        if self.ttl_secs == 0 {
            return Err(JanitorError::Config("ttl_secs must be greater than zero".into()));
        }
        // tokio::time::interval panics on a zero period
        if self.sweep_interval_secs == 0 {
            return Err(JanitorError::Config(
                "sweep_interval_secs must be greater than zero".into(),
            ));
        }
        if self.deletion.max_attempts == 0 {
            return Err(JanitorError::Config(
                "deletion.max_attempts must be greater than zero".into(),
            ));
        }
        if !(self.deletion.backoff_multiplier >= 1.0 && self.deletion.backoff_multiplier.is_finite()) {
            return Err(JanitorError::Config(format!(
                "deletion.backoff_multiplier must be a finite value >= 1.0, got {}",
                self.deletion.backoff_multiplier
            )));
        }
        Ok(())
    }
}
