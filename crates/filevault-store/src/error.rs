//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record or blob not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write named a file version other than the stored one: a publication
    /// that does not advance it by exactly one, or a grant for a superseded DEK.
    #[error("version conflict for file {file_id}: expected current version {expected}, found {found}")]
    Conflict {
        file_id: String,
        expected: u64,
        found: u64,
    },

    /// Invalid data in storage or in a write request.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// A blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
