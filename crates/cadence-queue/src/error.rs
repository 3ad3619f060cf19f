//! Error types for queue operations.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use cadence_store::{QueueStatus, StoreError, ValidationError};

/// Errors surfaced by queue operations.
///
/// Every variant maps to a stable machine-readable kind via [`QueueError::kind`];
/// callers outside the core never see raw store or collaborator errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The request failed validation (past time, empty destinations, ...).
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ValidationError),

    /// An existing entry sharing a destination is scheduled too close by.
    #[error("scheduling conflict with entry {existing} at {existing_time}")]
    SchedulingConflict {
        existing: Uuid,
        existing_time: DateTime<Utc>,
    },

    /// The entry does not exist, is owned by someone else, or is not in a
    /// status the operation allows.
    #[error("queue entry not found: {0}")]
    NotFound(Uuid),

    /// Bulk status changes only support cancelling and re-scheduling.
    #[error("unsupported bulk target status: {0}")]
    UnsupportedBulkStatus(QueueStatus),

    /// The content source collaborator failed.
    #[error("content source error: {0}")]
    Source(String),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl QueueError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSchedule(_) => "invalid_schedule",
            Self::SchedulingConflict { .. } => "scheduling_conflict",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedBulkStatus(_) => "unsupported_bulk_status",
            Self::Source(_) => "content_source",
            Self::Store(_) => "store",
        }
    }
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                existing,
                existing_time,
            } => Self::SchedulingConflict {
                existing,
                existing_time,
            },
            other => Self::Store(other),
        }
    }
}
