//! Error types for Janitor operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during Reaper operations
#[derive(Error, Debug)]
pub enum JanitorError {
    /// Storage layer error
    #[error("Storage error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A backing file could not be removed
#[derive(Error, Debug)]
pub enum DeletionError {
    /// Every attempt hit a transient lock or permission error
    #[error("Failed to delete {path} after {attempts} attempts: {source}")]
    Exhausted {
        /// File being deleted
        path: PathBuf,
        /// Attempts performed
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: io::Error,
    },

    /// The error is not one that retrying can fix
    #[error("Failed to delete {path}: {source}")]
    Permanent {
        /// File being deleted
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}
