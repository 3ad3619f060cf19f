//! Analytics for Cadence.
//!
//! Aggregates historical posting outcomes into:
//! - daily metrics over a date range
//! - optimal-time suggestions (weighted engagement scores per destination,
//!   weekday, and hour), with static per-platform fallbacks
//! - posting-pattern and content-performance reports
//!
//! Query failures on the optimal-time path degrade to the default tables so
//! the processing loop is never blocked by analytics.

mod defaults;
mod engine;
mod error;

pub use defaults::default_suggestions;
pub use engine::{
    AnalyticsEngine, ContentPerformance, DailyMetrics, DestinationTotals, PostingPatterns,
    RangeMetrics,
};
pub use error::AnalyticsError;
