//! Trait definitions for external interactions
//!
//! These traits define the boundary between the artifact lifecycle logic and
//! whatever holds the tracking index. Implementations live in other crates.

use crate::{ArtifactId, ArtifactRecord};
use std::path::PathBuf;

/// Registry of tracked artifacts
///
/// Implemented by the infrastructure layer (reel-store). Every method takes
/// `&self`: implementations are shared between concurrently handled requests
/// and the background reaper, so they synchronize internally. A lookup racing
/// a removal of the same id sees either the whole record or nothing.
pub trait ArtifactStore: Send + Sync {
    /// Error type for store operations
    type Error;

    /// Track a new artifact, returning its freshly generated id
    fn register(
        &self,
        path: PathBuf,
        display_filename: String,
        original_filename: String,
        size_bytes: u64,
    ) -> Result<ArtifactId, Self::Error>;

    /// Get a record by id
    fn lookup(&self, id: ArtifactId) -> Result<Option<ArtifactRecord>, Self::Error>;

    /// Atomically remove a record, returning it if it was present
    fn remove(&self, id: ArtifactId) -> Result<Option<ArtifactRecord>, Self::Error>;

    /// Snapshot of every tracked record
    fn list(&self) -> Result<Vec<ArtifactRecord>, Self::Error>;

    /// Number of tracked records
    fn count(&self) -> Result<usize, Self::Error>;

    /// Atomically remove and return every record older than `ttl_secs` at `now`
    fn remove_expired(&self, now: u64, ttl_secs: u64) -> Result<Vec<ArtifactRecord>, Self::Error>;
}
