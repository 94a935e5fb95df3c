//! Error types for the search subsystem.
//!
//! The per-tick search path never fails; lookups return `Option` or `bool`.
//! These errors only surface at the data boundaries: config parsing and
//! snapshot encoding.

use thiserror::Error;

use crate::ids::GroupId;

/// Result type alias using [`SearchError`].
pub type Result<T> = std::result::Result<T, SearchError>;

/// Top-level error type for search configuration and persistence.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Failed to read a config file.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path to the file that failed to load.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid RON.
    #[error("Failed to parse search config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Snapshot could not be encoded or decoded.
    #[error("Snapshot encoding failed: {0}")]
    Snapshot(#[from] bincode::Error),

    /// Snapshot was written by an incompatible version.
    #[error("Snapshot version mismatch: expected {expected}, got {found}")]
    SnapshotVersion {
        /// Version this build understands.
        expected: u32,
        /// Version found in the data.
        found: u32,
    },

    /// Snapshot refers to a group twice.
    #[error("Duplicate group in snapshot: {0}")]
    DuplicateGroup(GroupId),
}
