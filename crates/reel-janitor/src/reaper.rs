//! Core Reaper implementation: TTL eviction of tracked artifacts

use crate::{DisposalJob, Disposer, JanitorError, ReaperConfig, ReaperMetrics, SafeDeleter};
use reel_domain::{unix_now, ArtifactRecord, ArtifactStore};
use std::sync::Mutex;
use std::time::Instant;

/// Reaper service for artifact eviction
///
/// Responsible for:
/// - Removing artifacts older than the TTL from the store
/// - Handing their backing files to the [`Disposer`]
/// - Emptying the store on shutdown
/// - Collecting metrics on sweeps
///
/// Store removal is unconditional: an entry leaves the index even when its
/// file cannot be deleted, trading a possible orphaned file for an index
/// that never points at dead artifacts.
///
/// # Examples
///
/// ```no_run
/// use reel_domain::unix_now;
/// use reel_janitor::{Reaper, ReaperConfig};
/// use reel_store::MemoryStore;
///
/// # async fn demo() -> Result<(), reel_janitor::JanitorError> {
/// let store = MemoryStore::new();
/// let reaper = Reaper::new(ReaperConfig::default());
///
/// let evicted = reaper.sweep(&store, unix_now()).await?;
/// println!("evicted {evicted}");
/// # Ok(())
/// # }
/// ```
pub struct Reaper {
    config: ReaperConfig,
    disposer: Disposer,
    metrics: Mutex<ReaperMetrics>,
}

impl Reaper {
    /// Create a Reaper whose disposal mode follows `config.background_deletion`
    ///
    /// Background mode spawns a task, so this must run inside a tokio runtime
    /// when it is enabled.
    pub fn new(config: ReaperConfig) -> Self {
        let deleter = SafeDeleter::new(config.deletion.clone());
        let disposer = if config.background_deletion {
            Disposer::background(deleter)
        } else {
            Disposer::inline(deleter)
        };
        Self::with_disposer(config, disposer)
    }

    /// Create a Reaper with an explicit disposer
    pub fn with_disposer(config: ReaperConfig, disposer: Disposer) -> Self {
        Self {
            config,
            disposer,
            metrics: Mutex::new(ReaperMetrics::new()),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Disposer handling backing files
    pub fn disposer(&self) -> &Disposer {
        &self.disposer
    }

    /// Snapshot of the current metrics
    pub fn metrics(&self) -> ReaperMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reset metrics counters
    pub fn reset_metrics(&self) {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
    }

    /// Evict every artifact with `now - created_at > ttl`
    ///
    /// Returns the number of artifacts removed from the store. File
    /// deletion failures are logged by the disposer and never surface here.
    pub async fn sweep<S>(&self, store: &S, now: u64) -> Result<usize, JanitorError>
    where
        S: ArtifactStore + ?Sized,
        S::Error: std::fmt::Display,
    {
        let start = Instant::now();
        let ttl_secs = self.config.ttl_secs;

        if self.config.dry_run {
            let candidates = store
                .list()
                .map_err(|e| JanitorError::Store(e.to_string()))?
                .into_iter()
                .filter(|r| r.is_expired(now, ttl_secs))
                .count();
            if candidates > 0 {
                tracing::info!("DRY RUN: Would evict {} expired artifacts", candidates);
            }
            self.with_metrics(|m| {
                m.record_dry_run(candidates);
                m.record_sweep(0, start.elapsed());
            });
            return Ok(0);
        }

        let expired = store
            .remove_expired(now, ttl_secs)
            .map_err(|e| JanitorError::Store(e.to_string()))?;
        let evicted = self.dispose_all(&expired, now).await;

        if evicted > 0 {
            tracing::info!(evicted, ttl_secs, "Evicted expired artifacts");
        }
        self.with_metrics(|m| m.record_sweep(evicted, start.elapsed()));

        Ok(evicted)
    }

    /// Sweep using the current wall clock
    pub async fn sweep_now<S>(&self, store: &S) -> Result<usize, JanitorError>
    where
        S: ArtifactStore + ?Sized,
        S::Error: std::fmt::Display,
    {
        self.sweep(store, unix_now()).await
    }

    /// Remove every tracked artifact regardless of age
    ///
    /// Used on shutdown. Ignores `dry_run`.
    pub async fn evict_all<S>(&self, store: &S) -> Result<usize, JanitorError>
    where
        S: ArtifactStore + ?Sized,
        S::Error: std::fmt::Display,
    {
        let start = Instant::now();
        let mut removed = Vec::new();

        for record in store.list().map_err(|e| JanitorError::Store(e.to_string()))? {
            // A concurrent delete may have taken it already
            if let Some(record) = store
                .remove(record.id)
                .map_err(|e| JanitorError::Store(e.to_string()))?
            {
                removed.push(record);
            }
        }

        let evicted = self.dispose_all(&removed, unix_now()).await;
        tracing::info!(evicted, "Evicted all tracked artifacts");
        self.with_metrics(|m| m.record_sweep(evicted, start.elapsed()));

        Ok(evicted)
    }

    async fn dispose_all(&self, records: &[ArtifactRecord], now: u64) -> usize {
        for record in records {
            tracing::debug!(
                artifact_id = %record.id,
                age_secs = record.age_secs(now),
                path = %record.path.display(),
                "Evicting artifact"
            );
            self.disposer.dispose(DisposalJob::for_artifact(record)).await;
        }
        records.len()
    }

    fn with_metrics(&self, f: impl FnOnce(&mut ReaperMetrics)) {
        f(&mut self.metrics.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("config", &self.config)
            .field("disposer", &self.disposer)
            .finish_non_exhaustive()
    }
}
