//! Domain types and SQLite persistence for the Cadence posting queue.
//!
//! This crate provides:
//! - The queue entry, schedule, and posting record types, with their status
//!   and recurrence enums modeled as closed variants
//! - [`QueueStore`], a SQLite-backed store whose multi-step mutations run
//!   under one connection lock (conflict-checked inserts, compare-and-set
//!   status transitions)

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::QueueStore;
pub use types::{
    CONFLICT_WINDOW_MINUTES, ContentFilters, ContentRef, DEFAULT_LOOKBACK_DAYS, EngagementMetrics,
    EntryFilter, MAX_ATTEMPTS, OptimalTimeSuggestion, PostingRecord, Priority, QueueEntry,
    QueueEntryPatch, QueueEntryRequest, QueueHealth, QueueStatus, Recurrence, Schedule,
    SelectionStrategy, SourceConfig, SourceKind, TimeSlot, ValidationError,
};
