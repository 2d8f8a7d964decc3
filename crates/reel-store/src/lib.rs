//! Reel Storage Layer
//!
//! In-memory implementation of the `ArtifactStore` trait, plus the chunked
//! file reader used to serve artifact bytes.
//!
//! # Architecture
//!
//! - `HashMap` behind a `std::sync::RwLock`: lookups and listings share the
//!   lock, registrations and removals take it exclusively
//! - Critical sections never perform I/O, so a std lock is safe to use from
//!   async handlers
//! - Nothing is persisted; a restart forgets every artifact
//!
//! # Examples
//!
//! ```
//! use reel_domain::ArtifactStore;
//! use reel_store::MemoryStore;
//! use std::path::PathBuf;
//!
//! let store = MemoryStore::new();
//! let id = store
//!     .register(PathBuf::from("temp/out.mp4"), "processed.mp4".into(), "clip.mp4".into(), 1024)
//!     .unwrap();
//! assert_eq!(store.lookup(id).unwrap().unwrap().size_bytes, 1024);
//! ```

#![warn(missing_docs)]

pub mod stream;

pub use stream::{ChunkStream, StreamError, DEFAULT_CHUNK_SIZE};

use reel_domain::{unix_now, ArtifactId, ArtifactRecord, ArtifactStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A thread panicked while holding the registry lock
    #[error("Artifact registry lock poisoned")]
    LockPoisoned,

    /// Freshly generated id collided with a tracked one
    #[error("Duplicate artifact id: {0}")]
    Duplicate(ArtifactId),
}

/// Thread-safe in-memory artifact registry
///
/// Share it as `Arc<MemoryStore>` between request handlers and the reaper.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<ArtifactId, ArtifactRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of `size_bytes` over every tracked record
    pub fn tracked_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.values().map(|r| r.size_bytes).sum())
    }

    /// Insert a fully formed record
    ///
    /// Used when the caller needs control over `created_at` (restoring a
    /// snapshot, or tests). Fails if the id is already tracked.
    pub fn insert(&self, record: ArtifactRecord) -> Result<(), StoreError> {
        let mut records = self.write()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ArtifactId, ArtifactRecord>>, StoreError> {
        self.records.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ArtifactId, ArtifactRecord>>, StoreError> {
        self.records.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ArtifactStore for MemoryStore {
    type Error = StoreError;

    fn register(
        &self,
        path: PathBuf,
        display_filename: String,
        original_filename: String,
        size_bytes: u64,
    ) -> Result<ArtifactId, Self::Error> {
        let mut records = self.write()?;

        // UUIDv7 carries 74 random bits; a collision means a broken RNG
        let id = ArtifactId::new();
        if records.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }

        let record = ArtifactRecord::new(
            id,
            path,
            display_filename,
            original_filename,
            size_bytes,
            unix_now(),
        );

        tracing::debug!(
            artifact_id = %id,
            path = %record.path.display(),
            size_bytes,
            "Registered artifact"
        );

        records.insert(id, record);
        Ok(id)
    }

    fn lookup(&self, id: ArtifactId) -> Result<Option<ArtifactRecord>, Self::Error> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn remove(&self, id: ArtifactId) -> Result<Option<ArtifactRecord>, Self::Error> {
        Ok(self.write()?.remove(&id))
    }

    fn list(&self) -> Result<Vec<ArtifactRecord>, Self::Error> {
        let mut records: Vec<ArtifactRecord> = self.read()?.values().cloned().collect();
        // UUIDv7 order is registration order
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn count(&self) -> Result<usize, Self::Error> {
        Ok(self.read()?.len())
    }

    fn remove_expired(&self, now: u64, ttl_secs: u64) -> Result<Vec<ArtifactRecord>, Self::Error> {
        let mut records = self.write()?;

        let expired: Vec<ArtifactId> = records
            .values()
            .filter(|r| r.is_expired(now, ttl_secs))
            .map(|r| r.id)
            .collect();

        Ok(expired
            .into_iter()
            .filter_map(|id| records.remove(&id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(created_at: u64) -> ArtifactRecord {
        ArtifactRecord::new(
            ArtifactId::new(),
            PathBuf::from("temp/out.mp4"),
            "processed.mp4".to_string(),
            "clip.mp4".to_string(),
            100,
            created_at,
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let store = MemoryStore::new();
        let before = unix_now();
        let id = store
            .register(
                PathBuf::from("temp/a_out.mp4"),
                "processed.mp4".to_string(),
                "a.mp4".to_string(),
                2048,
            )
            .unwrap();

        let record = store.lookup(id).unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.path, PathBuf::from("temp/a_out.mp4"));
        assert_eq!(record.original_filename, "a.mp4");
        assert_eq!(record.size_bytes, 2048);
        assert!(record.created_at >= before);
    }

    #[test]
    fn test_lookup_unknown_id() {
        let store = MemoryStore::new();
        assert!(store.lookup(ArtifactId::new()).unwrap().is_none());
    }

    #[test]
    fn test_remove_returns_previous_record() {
        let store = MemoryStore::new();
        let id = store
            .register(PathBuf::from("x"), "x".into(), "x".into(), 1)
            .unwrap();

        let removed = store.remove(id).unwrap();
        assert_eq!(removed.map(|r| r.id), Some(id));
        assert!(store.remove(id).unwrap().is_none());
        assert!(store.lookup(id).unwrap().is_none());
    }

    #[test]
    fn test_list_and_count() {
        let store = MemoryStore::new();
        let ids: Vec<_> = (0..3)
            .map(|i| {
                store
                    .register(PathBuf::from(format!("{i}")), "p".into(), "o".into(), 10)
                    .unwrap()
            })
            .collect();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.tracked_bytes().unwrap(), 30);

        let listed: Vec<_> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_remove_expired_only_takes_stale() {
        let store = MemoryStore::new();
        let t0 = 1_000_000;
        let stale = record_at(t0);
        let fresh = record_at(t0 + 100);
        store.insert(stale.clone()).unwrap();
        store.insert(fresh.clone()).unwrap();

        let evicted = store.remove_expired(t0 + 1801, 1800).unwrap();
        assert_eq!(evicted, vec![stale.clone()]);
        assert!(store.lookup(stale.id).unwrap().is_none());
        assert_eq!(store.lookup(fresh.id).unwrap(), Some(fresh));
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let store = MemoryStore::new();
        let record = record_at(1);
        store.insert(record.clone()).unwrap();
        assert!(matches!(store.insert(record), Err(StoreError::Duplicate(_))));
    }
}
