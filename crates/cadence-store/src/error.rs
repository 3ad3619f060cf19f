//! Error types for the store.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column failed to encode or decode.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A persisted timestamp failed to parse.
    #[error("corrupt timestamp column: {0}")]
    Timestamp(String),

    /// A persisted enum tag failed to parse.
    #[error("corrupt enum column: {0}")]
    EnumTag(String),

    /// Another entry sharing a destination is scheduled too close by.
    #[error("scheduling conflict with entry {existing} at {existing_time}")]
    Conflict {
        existing: Uuid,
        existing_time: DateTime<Utc>,
    },
}
