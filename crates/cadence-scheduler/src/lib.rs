//! Recurring-schedule management: CRUD, timezone-aware expansion into
//! posting instants, and optimal-time lookups backed by analytics.

mod error;
mod scheduler;

pub use error::SchedulerError;
pub use scheduler::{occurrences, PlannedPost, ScheduleRequest, Scheduler};
