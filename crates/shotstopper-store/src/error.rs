//! Error types for shotstopper-store.

use std::path::PathBuf;

/// Result type for shotstopper-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in shotstopper-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp was out of range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
