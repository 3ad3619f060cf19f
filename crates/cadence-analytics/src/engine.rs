//! Aggregation of posting outcomes into reports and optimal-time scores.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cadence_queue::DestinationRegistry;
use cadence_store::{OptimalTimeSuggestion, QueueStatus, QueueStore};

use crate::defaults::default_suggestions;
use crate::error::AnalyticsError;

/// How far back engagement history is considered for optimal-time scoring.
const HISTORY_DAYS: i64 = 90;

/// Number of suggestions returned by optimal-time scoring.
const TOP_SUGGESTIONS: usize = 20;

/// Counts for one calendar day in an aggregation range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    /// Entries created on this day.
    pub queued: u64,
    /// Successful destination posts on this day.
    pub posted: u64,
    /// Failed destination posts on this day.
    pub failed: u64,
}

/// Success/failure totals for one destination across a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationTotals {
    pub succeeded: u64,
    pub failed: u64,
}

/// Aggregated metrics over a date range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeMetrics {
    pub days: Vec<DailyMetrics>,
    pub destinations: HashMap<String, DestinationTotals>,
}

/// Descriptive posting distribution, for reporting surfaces only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingPatterns {
    /// Successful posts per UTC hour of day.
    pub by_hour: HashMap<u8, u64>,
    /// Successful posts per weekday.
    pub by_weekday: HashMap<Weekday, u64>,
    /// Successful posts per destination.
    pub by_destination: HashMap<String, u64>,
}

/// Outcome and engagement totals per content kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPerformance {
    pub content_kind: String,
    pub posts: u64,
    pub succeeded: u64,
    pub average_engagement: f64,
}

/// Aggregates historical posting outcomes.
///
/// Scoring and aggregation are pure folds over store reads; nothing here
/// feeds back into scheduling except through the returned data.
pub struct AnalyticsEngine {
    store: Arc<QueueStore>,
    registry: Arc<DestinationRegistry>,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<QueueStore>, registry: Arc<DestinationRegistry>) -> Self {
        Self { store, registry }
    }

    /// Daily queued/posted/failed counts plus per-destination totals over
    /// `[start, end)`.
    pub fn aggregate(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RangeMetrics, AnalyticsError> {
        if start > end {
            return Err(AnalyticsError::InvalidRange { start, end });
        }

        let mut by_day: HashMap<NaiveDate, DailyMetrics> = HashMap::new();
        fn day_entry(
            map: &mut HashMap<NaiveDate, DailyMetrics>,
            date: NaiveDate,
        ) -> &mut DailyMetrics {
            map.entry(date).or_insert_with(|| DailyMetrics {
                date,
                ..Default::default()
            })
        }

        for entry in self.store.entries_created_between(owner_id, start, end)? {
            day_entry(&mut by_day, entry.created_at.date_naive()).queued += 1;
            // Terminal failures count on the day they last changed.
            if entry.status == QueueStatus::Failed {
                day_entry(&mut by_day, entry.updated_at.date_naive()).failed += 1;
            }
        }

        let mut destinations: HashMap<String, DestinationTotals> = HashMap::new();
        for record in self.store.records_between(owner_id, start, end)? {
            let day = day_entry(&mut by_day, record.posted_at.date_naive());
            let totals = destinations.entry(record.destination_id.clone()).or_default();
            if record.success {
                day.posted += 1;
                totals.succeeded += 1;
            } else {
                day.failed += 1;
                totals.failed += 1;
            }
        }

        let mut days: Vec<DailyMetrics> = by_day.into_values().collect();
        days.sort_by_key(|d| d.date);
        Ok(RangeMetrics { days, destinations })
    }

    /// Top posting times by average engagement, best first.
    ///
    /// Joins the last 90 days of successful, engagement-bearing records to
    /// their entry's scheduled weekday and hour, scores each bucket, and
    /// returns the top 20. Falls back to the static default table when no
    /// qualifying history exists; store errors degrade to the same defaults
    /// rather than failing the caller.
    pub fn optimal_times(
        &self,
        owner_id: &str,
        destination_id: Option<&str>,
    ) -> Vec<OptimalTimeSuggestion> {
        let since = Utc::now() - Duration::days(HISTORY_DAYS);
        let history = match self.store.engagement_history(owner_id, since) {
            Ok(history) => history,
            Err(e) => {
                warn!(owner = %owner_id, error = %e, "engagement query failed, using defaults");
                return self.fallback(destination_id);
            }
        };

        // (destination, weekday, hour) -> (score sum, sample count)
        let mut buckets: HashMap<(String, Weekday, u8), (f64, u64)> = HashMap::new();
        for (record, scheduled_for) in history {
            if destination_id.is_some_and(|d| d != record.destination_id) {
                continue;
            }
            let Some(engagement) = record.engagement else {
                continue;
            };
            let key = (
                record.destination_id,
                scheduled_for.weekday(),
                scheduled_for.hour() as u8,
            );
            let bucket = buckets.entry(key).or_insert((0.0, 0));
            bucket.0 += engagement.score();
            bucket.1 += 1;
        }

        if buckets.is_empty() {
            debug!(owner = %owner_id, "no engagement history, using default table");
            return self.fallback(destination_id);
        }

        let mut suggestions: Vec<OptimalTimeSuggestion> = buckets
            .into_iter()
            .map(
                |((destination_id, weekday, hour), (sum, count))| OptimalTimeSuggestion {
                    destination_id,
                    weekday,
                    hour,
                    score: sum / count as f64,
                },
            )
            .collect();
        suggestions.sort_by(|a, b| b.score.total_cmp(&a.score));
        suggestions.truncate(TOP_SUGGESTIONS);
        suggestions
    }

    fn fallback(&self, destination_id: Option<&str>) -> Vec<OptimalTimeSuggestion> {
        match destination_id {
            Some(id) => default_suggestions(id, self.registry.kind_of(id)),
            None => {
                let mut all: Vec<OptimalTimeSuggestion> = self
                    .registry
                    .account_ids()
                    .flat_map(|id| default_suggestions(id, self.registry.kind_of(id)))
                    .collect();
                if all.is_empty() {
                    all = default_suggestions("default", None);
                }
                all
            }
        }
    }

    /// Distribution of successful posts by hour, weekday, and destination
    /// over the last 90 days.
    pub fn posting_patterns(&self, owner_id: &str) -> Result<PostingPatterns, AnalyticsError> {
        let since = Utc::now() - Duration::days(HISTORY_DAYS);
        let records = self.store.records_between(owner_id, since, Utc::now())?;

        let mut patterns = PostingPatterns::default();
        for record in records.into_iter().filter(|r| r.success) {
            *patterns
                .by_hour
                .entry(record.posted_at.hour() as u8)
                .or_default() += 1;
            *patterns
                .by_weekday
                .entry(record.posted_at.weekday())
                .or_default() += 1;
            *patterns.by_destination.entry(record.destination_id).or_default() += 1;
        }
        Ok(patterns)
    }

    /// Outcome and engagement totals per content kind over the last 90 days.
    pub fn content_performance(
        &self,
        owner_id: &str,
    ) -> Result<Vec<ContentPerformance>, AnalyticsError> {
        let since = Utc::now() - Duration::days(HISTORY_DAYS);
        let rows = self.store.records_with_content(owner_id, since)?;

        // kind -> (posts, successes, engagement sum, engagement samples)
        let mut by_kind: HashMap<&'static str, (u64, u64, f64, u64)> = HashMap::new();
        for (record, content) in &rows {
            let bucket = by_kind.entry(content.kind_label()).or_default();
            bucket.0 += 1;
            if record.success {
                bucket.1 += 1;
            }
            if let Some(engagement) = record.engagement {
                bucket.2 += engagement.score();
                bucket.3 += 1;
            }
        }

        let mut report: Vec<ContentPerformance> = by_kind
            .into_iter()
            .map(
                |(kind, (posts, succeeded, score_sum, samples))| ContentPerformance {
                    content_kind: kind.to_string(),
                    posts,
                    succeeded,
                    average_engagement: if samples == 0 {
                        0.0
                    } else {
                        score_sum / samples as f64
                    },
                },
            )
            .collect();
        report.sort_by(|a, b| b.average_engagement.total_cmp(&a.average_engagement));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_queue::DestinationKind;
    use cadence_store::{
        ContentRef, EngagementMetrics, PostingRecord, Priority, QueueEntry, SourceKind,
    };
    use uuid::Uuid;

    fn posted_entry(
        store: &QueueStore,
        owner: &str,
        scheduled_for: DateTime<Utc>,
        content: ContentRef,
    ) -> QueueEntry {
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            status: QueueStatus::Posted,
            priority: Priority::Normal,
            content,
            scheduled_for,
            posted_at: Some(scheduled_for),
            destination_ids: vec!["acct-1".to_string()],
            attempts: 1,
            last_attempt_at: Some(scheduled_for),
            next_retry_at: None,
            last_error: None,
            schedule_id: None,
            metadata: serde_json::Value::Null,
            created_at: scheduled_for - Duration::hours(1),
            updated_at: scheduled_for,
        };
        store
            .insert_entry_checked(&entry, Duration::minutes(30))
            .unwrap();
        entry
    }

    fn record_with_engagement(
        store: &QueueStore,
        entry: &QueueEntry,
        destination: &str,
        likes: u64,
    ) {
        let mut record = PostingRecord::success(entry.id, destination, entry.posted_at.unwrap());
        record.engagement = Some(EngagementMetrics {
            likes,
            comments: 0,
            shares: 0,
            views: 0,
        });
        store.insert_record(&record).unwrap();
    }

    fn engine() -> (AnalyticsEngine, Arc<QueueStore>) {
        let store = Arc::new(QueueStore::open_in_memory().unwrap());
        let mut registry = DestinationRegistry::new();
        registry.register_account("acct-1", DestinationKind::Mastodon);
        (
            AnalyticsEngine::new(store.clone(), Arc::new(registry)),
            store,
        )
    }

    fn inline() -> ContentRef {
        ContentRef::Inline {
            caption: "c".to_string(),
            media_urls: vec![],
            hashtags: vec![],
        }
    }

    #[test]
    fn test_optimal_times_prefers_higher_engagement() {
        let (engine, store) = engine();
        let now = Utc::now();

        // Two posts at one slot with strong engagement, one weak elsewhere
        let strong_a = posted_entry(&store, "alice", now - Duration::days(7), inline());
        let strong_b = posted_entry(&store, "alice", now - Duration::days(14), inline());
        let weak = posted_entry(&store, "alice", now - Duration::days(3), inline());
        record_with_engagement(&store, &strong_a, "acct-1", 100);
        record_with_engagement(&store, &strong_b, "acct-1", 60);
        record_with_engagement(&store, &weak, "acct-1", 1);

        let suggestions = engine.optimal_times("alice", Some("acct-1"));
        assert!(!suggestions.is_empty());
        assert!(suggestions[0].score >= suggestions.last().unwrap().score);
        // The strongest bucket averages 80 (same weekday/hour one week apart)
        assert!((suggestions[0].score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_optimal_times_falls_back_to_defaults() {
        let (engine, _store) = engine();
        let suggestions = engine.optimal_times("alice", Some("acct-1"));
        assert!(!suggestions.is_empty());
        assert!(suggestions.iter().all(|s| s.score == 0.0));
        assert!(suggestions.iter().all(|s| s.destination_id == "acct-1"));
    }

    #[test]
    fn test_aggregate_counts_by_day_and_destination() {
        let (engine, store) = engine();
        let now = Utc::now();

        let entry = posted_entry(&store, "alice", now - Duration::days(2), inline());
        store
            .insert_record(&PostingRecord::success(
                entry.id,
                "acct-1",
                entry.posted_at.unwrap(),
            ))
            .unwrap();
        store
            .insert_record(&PostingRecord::failure(
                entry.id,
                "acct-2",
                "rate limited".to_string(),
                entry.posted_at.unwrap(),
            ))
            .unwrap();

        let metrics = engine
            .aggregate("alice", now - Duration::days(7), now)
            .unwrap();
        let queued: u64 = metrics.days.iter().map(|d| d.queued).sum();
        let posted: u64 = metrics.days.iter().map(|d| d.posted).sum();
        let failed: u64 = metrics.days.iter().map(|d| d.failed).sum();
        assert_eq!(queued, 1);
        assert_eq!(posted, 1);
        assert_eq!(failed, 1);
        assert_eq!(metrics.destinations["acct-1"].succeeded, 1);
        assert_eq!(metrics.destinations["acct-2"].failed, 1);
    }

    #[test]
    fn test_aggregate_rejects_inverted_range() {
        let (engine, _store) = engine();
        let now = Utc::now();
        assert!(matches!(
            engine.aggregate("alice", now, now - Duration::days(1)),
            Err(AnalyticsError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_posting_patterns_count_successes_only() {
        let (engine, store) = engine();
        let now = Utc::now();

        let entry = posted_entry(&store, "alice", now - Duration::days(1), inline());
        store
            .insert_record(&PostingRecord::success(
                entry.id,
                "acct-1",
                entry.posted_at.unwrap(),
            ))
            .unwrap();
        store
            .insert_record(&PostingRecord::failure(
                entry.id,
                "acct-1",
                "nope".to_string(),
                entry.posted_at.unwrap(),
            ))
            .unwrap();

        let patterns = engine.posting_patterns("alice").unwrap();
        assert_eq!(patterns.by_destination["acct-1"], 1);
        assert_eq!(patterns.by_hour.values().sum::<u64>(), 1);
    }

    #[test]
    fn test_content_performance_groups_by_kind() {
        let (engine, store) = engine();
        let now = Utc::now();

        let image = posted_entry(
            &store,
            "alice",
            now - Duration::days(1),
            ContentRef::Inline {
                caption: "c".to_string(),
                media_urls: vec!["https://cdn.example/a.png".to_string()],
                hashtags: vec![],
            },
        );
        let library = posted_entry(
            &store,
            "alice",
            now - Duration::days(2),
            ContentRef::Library {
                source: SourceKind::Library,
                item_id: "item-1".to_string(),
                caption: None,
                hashtags: vec![],
            },
        );
        record_with_engagement(&store, &image, "acct-1", 10);
        record_with_engagement(&store, &library, "acct-1", 50);

        let report = engine.content_performance("alice").unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].content_kind, "library");
        assert!((report[0].average_engagement - 50.0).abs() < 1e-9);
    }
}
