//! Background worker for periodic sweeps

use crate::{JanitorError, Reaper, ReaperMetrics};
use reel_domain::ArtifactStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Background worker that sweeps on a fixed interval
///
/// Bounds how long an expired artifact can linger regardless of traffic.
/// Request-triggered sweeps share the same [`Reaper`] and can run alongside
/// it; the store's atomic `remove_expired` keeps them from evicting the same
/// record twice.
///
/// # Examples
///
/// ```no_run
/// use reel_janitor::{Reaper, ReaperConfig, ReaperWorker};
/// use reel_store::MemoryStore;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(MemoryStore::new());
///     let reaper = Arc::new(Reaper::new(ReaperConfig::default()));
///     let shutdown = CancellationToken::new();
///
///     let handle = ReaperWorker::new(reaper).spawn(store, shutdown.clone());
///     shutdown.cancel();
///     handle.await.unwrap();
/// }
/// ```
pub struct ReaperWorker {
    reaper: Arc<Reaper>,
    interval: Duration,
}

impl ReaperWorker {
    /// Create a worker using the reaper's configured interval
    pub fn new(reaper: Arc<Reaper>) -> Self {
        let interval = reaper.config().sweep_interval();
        Self { reaper, interval }
    }

    /// Sweep interval in use
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Sweep failures are logged and the loop continues.
    pub async fn run<S>(&self, store: Arc<S>, shutdown: CancellationToken)
    where
        S: ArtifactStore + ?Sized,
        S::Error: std::fmt::Display,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Reaper worker started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Starting sweep cycle");
                    match self.reaper.sweep_now(store.as_ref()).await {
                        Ok(evicted) => {
                            tracing::debug!(evicted, "Sweep completed");
                        }
                        Err(e) => {
                            tracing::error!("Sweep failed: {}", e);
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown signal received, stopping reaper worker");
                    break;
                }
            }
        }

        tracing::info!("Reaper worker stopped. Final metrics:\n{}", self.reaper.metrics().summary());
    }

    /// Spawn [`run`](Self::run) onto the current runtime
    pub fn spawn<S>(self, store: Arc<S>, shutdown: CancellationToken) -> JoinHandle<()>
    where
        S: ArtifactStore + ?Sized + 'static,
        S::Error: std::fmt::Display,
    {
        tokio::spawn(async move { self.run(store, shutdown).await })
    }

    /// Run for a specific number of cycles (useful for testing)
    pub async fn run_cycles<S>(&self, store: Arc<S>, cycles: usize) -> Result<(), JanitorError>
    where
        S: ArtifactStore + ?Sized,
        S::Error: std::fmt::Display,
    {
        let mut ticker = interval(self.interval);

        for cycle in 0..cycles {
            ticker.tick().await;
            tracing::debug!("Starting sweep cycle {}/{}", cycle + 1, cycles);

            if let Err(e) = self.reaper.sweep_now(store.as_ref()).await {
                tracing::error!("Sweep {}/{} failed: {}", cycle + 1, cycles, e);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Current reaper metrics
    pub fn metrics(&self) -> ReaperMetrics {
        self.reaper.metrics()
    }
}
