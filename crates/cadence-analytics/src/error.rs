//! Error types for analytics queries.

use thiserror::Error;

use cadence_store::StoreError;

/// Errors that can occur while building reports.
///
/// These only surface on the reporting API; the optimal-time path degrades
/// to defaults internally so the processing loop is never blocked.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}
