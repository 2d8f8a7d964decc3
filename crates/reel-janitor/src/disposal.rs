//! Best-effort disposal of evicted artifact files
//!
//! Eviction removes the tracking entry first; the backing file is handed to a
//! [`Disposer`]. In background mode deletions run on a dedicated task fed by
//! an unbounded channel, so neither requests nor sweeps wait out a retry
//! backoff. Outcomes are only logged and counted.

use crate::SafeDeleter;
use reel_domain::{ArtifactId, ArtifactRecord};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A file awaiting deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalJob {
    /// Artifact the file belonged to; `None` for untracked residue
    pub artifact_id: Option<ArtifactId>,
    /// File to delete
    pub path: PathBuf,
}

impl DisposalJob {
    /// Job for an evicted artifact's backing file
    pub fn for_artifact(record: &ArtifactRecord) -> Self {
        Self {
            artifact_id: Some(record.id),
            path: record.path.clone(),
        }
    }

    /// Job for a file no artifact tracks
    pub fn residual(path: PathBuf) -> Self {
        Self {
            artifact_id: None,
            path,
        }
    }
}

/// Snapshot of disposal counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DisposalStats {
    /// Jobs accepted but not finished
    pub pending: u64,
    /// Files deleted, or already absent
    pub succeeded: u64,
    /// Files left on disk after the retry policy gave up
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    pending: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

async fn run_job(deleter: &SafeDeleter, counters: &Counters, job: DisposalJob) {
    let artifact_id = job.artifact_id.map(|id| id.to_string()).unwrap_or_default();

    match deleter.delete(&job.path).await {
        Ok(report) => {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                artifact_id = %artifact_id,
                path = %job.path.display(),
                attempts = report.attempts,
                removed = report.removed,
                "Disposed artifact file"
            );
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                artifact_id = %artifact_id,
                path = %job.path.display(),
                error = %e,
                "Artifact file left on disk"
            );
        }
    }

    counters.pending.fetch_sub(1, Ordering::Relaxed);
}

/// Runs deletions inline or on a background queue
///
/// # Examples
///
/// ```no_run
/// use reel_janitor::{DeletionConfig, Disposer, DisposalJob, SafeDeleter};
///
/// #[tokio::main]
/// async fn main() {
///     let disposer = Disposer::background(SafeDeleter::new(DeletionConfig::default()));
///     disposer.dispose(DisposalJob::residual("temp/stale.mp4".into())).await;
///
///     // Wait for queued deletions before exiting
///     disposer.drain().await;
/// }
/// ```
pub struct Disposer {
    deleter: SafeDeleter,
    counters: Arc<Counters>,
    queue: Mutex<Option<mpsc::UnboundedSender<DisposalJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Disposer {
    /// Deletions are awaited by the caller
    pub fn inline(deleter: SafeDeleter) -> Self {
        Self {
            deleter,
            counters: Arc::default(),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Deletions run on a spawned task
    ///
    /// Must be called from within a tokio runtime.
    pub fn background(deleter: SafeDeleter) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DisposalJob>();
        let counters: Arc<Counters> = Arc::default();

        let worker_deleter = deleter.clone();
        let worker_counters = Arc::clone(&counters);
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(&worker_deleter, &worker_counters, job).await;
            }
            tracing::debug!("Deletion queue closed");
        });

        Self {
            deleter,
            counters,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Whether deletions are currently queued rather than awaited
    pub fn is_background(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Delete a file best-effort; never fails
    pub async fn dispose(&self, job: DisposalJob) {
        self.counters.pending.fetch_add(1, Ordering::Relaxed);

        let sender = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let job = match sender {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                // Worker gone; fall back to deleting here
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        run_job(&self.deleter, &self.counters, job).await;
    }

    /// Current counters
    pub fn stats(&self) -> DisposalStats {
        DisposalStats {
            pending: self.counters.pending.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for every queued deletion to finish
    ///
    /// Later calls to [`dispose`](Self::dispose) run inline.
    pub async fn drain(&self) {
        let sender = self.queue.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Deletion worker terminated abnormally");
            }
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("background", &self.is_background())
            .field("stats", &self.stats())
            .finish()
    }
}
