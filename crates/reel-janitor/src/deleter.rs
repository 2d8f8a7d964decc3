//! Retrying file deletion
//!
//! Rendered videos may still be held open by a transfer or an antivirus
//! scanner when their artifact expires. [`SafeDeleter`] treats lock and
//! permission failures as transient and retries them with exponential
//! backoff, sleeping on the tokio timer so other requests keep running.

use crate::{DeletionConfig, DeletionError};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Filesystem seam used by [`SafeDeleter`]
#[async_trait]
pub trait FileRemover: Send + Sync {
    /// Whether `path` currently exists
    async fn exists(&self, path: &Path) -> io::Result<bool>;

    /// Remove the file at `path`
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileRemover`] backed by `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRemover;

#[async_trait]
impl FileRemover for TokioRemover {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Result of a single deletion attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The file was removed
    Deleted,
    /// Nothing to remove
    Absent,
    /// Worth retrying (lock, sharing violation, permission)
    Transient(io::Error),
    /// Retrying cannot help
    Permanent(io::Error),
}

impl AttemptOutcome {
    /// Classify the result of a removal call
    pub fn from_result(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => AttemptOutcome::Deleted,
            Err(e) => Self::from_error(e),
        }
    }

    /// Classify an I/O error
    pub fn from_error(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            AttemptOutcome::Absent
        } else if is_transient(&err) {
            AttemptOutcome::Transient(err)
        } else {
            AttemptOutcome::Permanent(err)
        }
    }
}

/// Lock and permission conditions that usually clear on their own
pub fn is_transient(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    #[cfg(windows)]
    if matches!(err.raw_os_error(), Some(32) | Some(33)) {
        return true;
    }

    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    )
}

/// What a successful [`SafeDeleter::delete`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    /// Attempts performed, including the successful one
    pub attempts: u32,
    /// Backoff waits performed between attempts, in order
    pub waits: Vec<Duration>,
    /// False when the file was already gone
    pub removed: bool,
}

/// Deletes files, retrying transient failures with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use reel_janitor::{DeletionConfig, SafeDeleter};
///
/// # async fn demo() -> Result<(), reel_janitor::DeletionError> {
/// let deleter = SafeDeleter::new(DeletionConfig::default());
/// let report = deleter.delete("temp/abc_clip_out.mp4".as_ref()).await?;
/// println!("removed after {} attempts", report.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SafeDeleter {
    config: DeletionConfig,
    remover: Arc<dyn FileRemover>,
}

impl SafeDeleter {
    /// Create a deleter operating on the real filesystem
    pub fn new(config: DeletionConfig) -> Self {
        Self::with_remover(config, Arc::new(TokioRemover))
    }

    /// Create a deleter with a custom filesystem seam
    pub fn with_remover(config: DeletionConfig, remover: Arc<dyn FileRemover>) -> Self {
        Self { config, remover }
    }

    /// Retry policy in use
    pub fn config(&self) -> &DeletionConfig {
        &self.config
    }

    /// Perform one attempt without retrying
    pub async fn attempt(&self, path: &Path) -> AttemptOutcome {
        match self.remover.exists(path).await {
            Ok(false) => return AttemptOutcome::Absent,
            Ok(true) => {}
            Err(e) => return AttemptOutcome::from_error(e),
        }
        AttemptOutcome::from_result(self.remover.remove_file(path).await)
    }

    /// Delete `path`, retrying transient failures
    ///
    /// A missing file succeeds immediately. Transient failures are retried
    /// until `max_attempts` attempts were made, waiting `delay` before each
    /// retry and growing `delay` by `backoff_multiplier` afterwards.
    pub async fn delete(&self, path: &Path) -> Result<DeletionReport, DeletionError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_delay();
        let mut waits = Vec::new();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.attempt(path).await {
                AttemptOutcome::Deleted => {
                    tracing::debug!(path = %path.display(), attempts, "Deleted file");
                    return Ok(DeletionReport {
                        attempts,
                        waits,
                        removed: true,
                    });
                }
                AttemptOutcome::Absent => {
                    tracing::debug!(path = %path.display(), "File already absent");
                    return Ok(DeletionReport {
                        attempts,
                        waits,
                        removed: false,
                    });
                }
                AttemptOutcome::Permanent(source) => {
                    return Err(DeletionError::Permanent {
                        path: path.to_path_buf(),
                        source,
                    });
                }
                AttemptOutcome::Transient(source) => {
                    if attempts >= max_attempts {
                        return Err(DeletionError::Exhausted {
                            path: path.to_path_buf(),
                            attempts,
                            source,
                        });
                    }

                    tracing::warn!(
                        path = %path.display(),
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "File busy, retrying deletion"
                    );

                    tokio::time::sleep(delay).await;
                    waits.push(delay);
                    delay = delay.mul_f64(self.config.backoff_multiplier);
                }
            }
        }
    }
}

impl std::fmt::Debug for SafeDeleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeDeleter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
