//! Reel Janitor
//!
//! Lifecycle maintenance for rendered artifacts: TTL eviction, retrying file
//! deletion, and the background worker that keeps both running.
//!
//! # Overview
//!
//! The Janitor is responsible for:
//! - **Eviction**: removing artifacts older than the TTL from the store
//! - **Safe deletion**: deleting backing files with exponential backoff on
//!   lock and permission errors
//! - **Disposal queue**: running deletions off the request path
//! - **Metrics collection**: tracking sweeps and deletion outcomes
//!
//! # Usage
//!
//! ## One-time Sweep
//!
//! ```no_run
//! use reel_janitor::{Reaper, ReaperConfig};
//! use reel_store::MemoryStore;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let reaper = Reaper::new(ReaperConfig::default());
//!
//! let evicted = reaper.sweep_now(&store).await?;
//! println!("{evicted} evicted\n{}", reaper.metrics().summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Background Worker
//!
//! ```no_run
//! use reel_janitor::{Reaper, ReaperConfig, ReaperWorker};
//! use reel_store::MemoryStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let reaper = Arc::new(Reaper::new(ReaperConfig::default()));
//!     let shutdown = CancellationToken::new();
//!
//!     let worker = ReaperWorker::new(reaper).spawn(store, shutdown.clone());
//!     // ... serve requests ...
//!     shutdown.cancel();
//!     worker.await.unwrap();
//! }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [reaper]
//! ttl_secs = 1800
//! sweep_interval_secs = 60
//! dry_run = false
//! background_deletion = true
//!
//! [reaper.deletion]
//! max_attempts = 5
//! initial_delay_ms = 1000
//! backoff_multiplier = 1.5
//! ```

#![warn(missing_docs)]

mod config;
mod deleter;
mod disposal;
mod error;
mod metrics;
mod reaper;
mod worker;

pub use config::{DeletionConfig, ReaperConfig};
pub use deleter::{is_transient, AttemptOutcome, DeletionReport, FileRemover, SafeDeleter, TokioRemover};
pub use disposal::{DisposalJob, DisposalStats, Disposer};
pub use error::{DeletionError, JanitorError};
pub use metrics::ReaperMetrics;
pub use reaper::Reaper;
pub use worker::ReaperWorker;
