use thiserror::Error;

use crate::{Collection, Precondition, RecordKey, Version};

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// A conditional write found the record at a different version.
    #[error("Concurrency conflict on {key}: expected {expected}, found version {actual}")]
    ConcurrencyConflict {
        key: RecordKey,
        expected: Precondition,
        actual: Version,
    },

    /// The batch itself is malformed (empty, or the same key written twice).
    #[error("Invalid write batch: {0}")]
    InvalidBatch(String),

    /// A collection was made to fail on purpose (in-memory store only).
    #[error("Collection {collection} is unavailable")]
    Unavailable { collection: Collection },

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecordStoreError {
    /// Returns true if the error is a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RecordStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, RecordStoreError>;
