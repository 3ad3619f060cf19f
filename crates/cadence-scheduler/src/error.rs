//! Error types for schedule operations.

use thiserror::Error;
use uuid::Uuid;

use cadence_store::{StoreError, ValidationError};

/// Errors that can occur in schedule CRUD and expansion.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The schedule failed validation (bad slot, empty days, bad timezone).
    #[error("invalid schedule: {0}")]
    Invalid(#[from] ValidationError),

    /// Schedule not found or owned by someone else.
    #[error("schedule not found: {0}")]
    NotFound(Uuid),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
