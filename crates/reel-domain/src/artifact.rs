//! Artifact module - the unit of work tracked by the store

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default artifact time-to-live: 30 minutes
pub const DEFAULT_TTL_SECS: u64 = 1800;

/// Current timestamp in seconds since Unix epoch
///
/// A clock before 1970 collapses to zero rather than panicking.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Unique identifier for an artifact based on UUIDv7
///
/// UUIDv7 provides:
/// - 128-bit uniqueness without coordination
/// - Chronological sortability, so a listing sorted by id is sorted by age
/// - A canonical hyphenated string form safe to embed in URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(u128);

impl ArtifactId {
    /// Generate a new UUIDv7-based ArtifactId
    ///
    /// # Examples
    ///
    /// ```
    /// use reel_domain::ArtifactId;
    ///
    /// let id = ArtifactId::new();
    /// assert!(id.value() > 0);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    /// Create an ArtifactId from a raw u128 value
    pub fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// Parse an ArtifactId from its hyphenated UUID string
    ///
    /// # Examples
    ///
    /// ```
    /// use reel_domain::ArtifactId;
    ///
    /// let id = ArtifactId::new();
    /// let parsed = ArtifactId::from_string(&id.to_string()).unwrap();
    /// assert_eq!(id, parsed);
    /// ```
    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_u128()))
            .map_err(|e| format!("Invalid artifact id '{}': {}", s, e))
    }

    /// Get the raw u128 value
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Milliseconds since Unix epoch encoded in the top 48 bits
    pub fn timestamp(&self) -> u64 {
        (self.0 >> 80) as u64
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_u128(self.0))
    }
}

impl FromStr for ArtifactId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

/// A tracked output file
///
/// Records are immutable snapshots: `size_bytes` is captured once at
/// registration and is what transfers advertise, even if the file changes
/// on disk afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    /// Unique identifier
    pub id: ArtifactId,

    /// Location of the backing file
    pub path: PathBuf,

    /// Name offered to clients on download
    pub display_filename: String,

    /// Name of the upload this artifact was rendered from
    pub original_filename: String,

    /// Size in bytes at registration time
    pub size_bytes: u64,

    /// Registration timestamp (seconds since Unix epoch)
    pub created_at: u64,
}

impl ArtifactRecord {
    /// Create a new record
    pub fn new(
        id: ArtifactId,
        path: PathBuf,
        display_filename: String,
        original_filename: String,
        size_bytes: u64,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            path,
            display_filename,
            original_filename,
            size_bytes,
            created_at,
        }
    }

    /// Age in seconds at `now`; zero if `now` precedes registration
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Eviction predicate: strictly older than `ttl_secs`
    ///
    /// # Examples
    ///
    /// ```
    /// use reel_domain::{ArtifactId, ArtifactRecord};
    /// use std::path::PathBuf;
    ///
    /// let record = ArtifactRecord::new(
    ///     ArtifactId::new(),
    ///     PathBuf::from("/tmp/out.mp4"),
    ///     "processed.mp4".to_string(),
    ///     "clip.mp4".to_string(),
    ///     42,
    ///     1_000,
    /// );
    /// assert!(!record.is_expired(1_000 + 1800, 1800));
    /// assert!(record.is_expired(1_000 + 1801, 1800));
    /// ```
    pub fn is_expired(&self, now: u64, ttl_secs: u64) -> bool {
        self.age_secs(now) > ttl_secs
    }
}
