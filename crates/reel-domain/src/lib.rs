//! Reel Domain Layer
//!
//! Core model for the ephemeral artifact store. Like every domain crate in
//! this workspace it carries no infrastructure: only value types and the
//! trait seams that the store, janitor and server crates implement or
//! consume.
//!
//! ## Key Concepts
//!
//! - **Artifact**: a rendered output file tracked for a limited time window
//! - **ArtifactId**: opaque UUIDv7 token, never reused
//! - **TTL**: maximum age before an artifact becomes eligible for eviction
//!
//! ## Architecture
//!
//! - One external dependency (`uuid`) for identifier generation
//! - Pure data and predicates only
//! - Storage, disposal and transport live in other crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod traits;

// Re-exports for convenience
pub use artifact::{unix_now, ArtifactId, ArtifactRecord, DEFAULT_TTL_SECS};
pub use traits::ArtifactStore;
