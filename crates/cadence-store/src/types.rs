//! Core domain types for the posting queue.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of posting attempts before an entry is permanently failed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Entries sharing a destination may not be scheduled closer together than this.
pub const CONFLICT_WINDOW_MINUTES: i64 = 30;

/// Validation failures for queue entries, schedules, and time slots.
///
/// These are rejected synchronously at the API boundary and never persisted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("scheduled time {0} is in the past")]
    ScheduledInPast(DateTime<Utc>),

    #[error("destination set must not be empty")]
    EmptyDestinations,

    #[error("weekly schedule requires at least one day of week")]
    EmptyDaysOfWeek,

    #[error("schedule requires at least one time slot")]
    EmptyTimeSlots,

    #[error("slot hour {0} out of range (0-23)")]
    HourOutOfRange(u8),

    #[error("slot minute {0} out of range (0-59)")]
    MinuteOutOfRange(u8),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("max_posts_per_day must be at least 1")]
    ZeroPostsPerDay,
}

/// Status of a queue entry.
///
/// `Posted`, `Cancelled`, and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Entry exists but is not yet eligible for pickup.
    #[default]
    Pending,
    /// Entry is waiting for its scheduled time (or retry time).
    Scheduled,
    /// Entry is currently being dispatched to its destinations.
    Processing,
    /// All destinations were attempted and at least one succeeded.
    Posted,
    /// Entry exhausted its attempts without any successful dispatch.
    Failed,
    /// Entry was cancelled before dispatch.
    Cancelled,
}

impl QueueStatus {
    /// Whether no further automatic transitions can occur from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Failed | Self::Cancelled)
    }

    /// Whether a manual cancel is allowed from this status.
    pub fn cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Posted => "posted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "processing" => Ok(Self::Processing),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

/// Relative priority of a queue entry. Higher priority breaks ties between
/// entries due at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Where schedule content is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The owner's stored media library.
    Library,
    /// One-off uploads attached directly to the schedule.
    Upload,
    /// An external feed the owner has connected.
    External,
}

/// The content a queue entry will post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentRef {
    /// A reference into a content source, resolved at dispatch time.
    Library {
        source: SourceKind,
        item_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        hashtags: Vec<String>,
    },
    /// Fully inline content, no source lookup needed.
    Inline {
        caption: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media_urls: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        hashtags: Vec<String>,
    },
}

impl ContentRef {
    /// The library item id, if this content references a source.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Library { item_id, .. } => Some(item_id),
            Self::Inline { .. } => None,
        }
    }

    /// Coarse content classification used by performance reports.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Library { .. } => "library",
            Self::Inline { media_urls, .. } => {
                let video = media_urls.iter().any(|u| {
                    let u = u.to_ascii_lowercase();
                    u.ends_with(".mp4") || u.ends_with(".mov") || u.ends_with(".webm")
                });
                if video {
                    "video"
                } else if media_urls.is_empty() {
                    "text"
                } else {
                    "image"
                }
            }
        }
    }
}

/// One content item scheduled for posting to one or more destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    /// Owner of this entry; all reads and writes are scoped by owner.
    pub owner_id: String,
    pub status: QueueStatus,
    pub priority: Priority,
    pub content: ContentRef,
    /// When this entry should be posted (UTC).
    pub scheduled_for: DateTime<Utc>,
    /// When this entry was actually posted, once it has been.
    pub posted_at: Option<DateTime<Utc>>,
    /// Destination account ids to post to. Never empty.
    pub destination_ids: Vec<String>,
    /// Number of dispatch attempts so far. Capped at [`MAX_ATTEMPTS`].
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the next retry may run. Unset unless a retry is pending.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Schedule that materialized this entry, if any.
    pub schedule_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Whether this entry is eligible for pickup at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Scheduled
            && self.scheduled_for <= now
            && self.next_retry_at.is_none_or(|t| t <= now)
    }

    /// Retry delay after the given number of failed attempts: 2^attempts hours.
    pub fn retry_delay(attempts: u32) -> Duration {
        Duration::hours(1 << attempts.min(MAX_ATTEMPTS))
    }

    /// Record a failed dispatch attempt at `now`.
    ///
    /// Re-enters `Scheduled` with an exponential retry delay while attempts
    /// remain, otherwise transitions to the terminal `Failed` status.
    pub fn record_failure(&mut self, error: String, now: DateTime<Utc>) {
        self.attempts = (self.attempts + 1).min(MAX_ATTEMPTS);
        self.last_attempt_at = Some(now);
        self.last_error = Some(error);
        if self.attempts < MAX_ATTEMPTS {
            self.status = QueueStatus::Scheduled;
            self.next_retry_at = Some(now + Self::retry_delay(self.attempts));
        } else {
            self.status = QueueStatus::Failed;
            self.next_retry_at = None;
        }
        self.updated_at = now;
    }

    /// Record a successful dispatch at `now`.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_attempt_at = Some(now);
        self.status = QueueStatus::Posted;
        self.posted_at = Some(now);
        self.next_retry_at = None;
        self.updated_at = now;
    }

    /// Reset failure state so the entry can be dispatched again immediately.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = QueueStatus::Scheduled;
        self.scheduled_for = now;
        self.attempts = 0;
        self.last_error = None;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    /// Whether this entry's destination set overlaps another's.
    pub fn shares_destination(&self, other_destinations: &[String]) -> bool {
        let mine: HashSet<&str> = self.destination_ids.iter().map(String::as_str).collect();
        other_destinations.iter().any(|d| mine.contains(d.as_str()))
    }
}

/// A request to create a queue entry, before validation and id assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntryRequest {
    pub content: ContentRef,
    pub scheduled_for: DateTime<Utc>,
    pub destination_ids: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<Uuid>,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Null
}

/// A partial update to a queue entry. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// How often a schedule recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Every calendar day.
    Daily,
    /// Only on the days listed in `days_of_week`.
    Weekly,
    /// Arbitrary slot combinations; an empty day filter means every day.
    Custom,
}

/// A wall-clock posting time in a specific IANA timezone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub hour: u8,
    pub minute: u8,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
}

impl TimeSlot {
    pub fn new(hour: u8, minute: u8, timezone: impl Into<String>) -> Self {
        Self {
            hour,
            minute,
            timezone: timezone.into(),
        }
    }

    /// Resolve the IANA timezone name, validating ranges as a side effect.
    pub fn tz(&self) -> Result<Tz, ValidationError> {
        self.validate()?;
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ValidationError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hour > 23 {
            return Err(ValidationError::HourOutOfRange(self.hour));
        }
        if self.minute > 59 {
            return Err(ValidationError::MinuteOutOfRange(self.minute));
        }
        if self.timezone.parse::<Tz>().is_err() {
            return Err(ValidationError::UnknownTimezone(self.timezone.clone()));
        }
        Ok(())
    }
}

/// How the content selector picks among eligible items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    Random,
    Oldest,
    Newest,
}

/// Constraints applied when listing candidate content items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentFilters {
    /// Acceptable MIME type prefixes, e.g. "image/". Empty means any.
    #[serde(default)]
    pub mime_prefixes: Vec<String>,
    /// Maximum item size in bytes. Unset means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
}

/// Default de-duplication look-back window, in days.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

/// Content source configuration for a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub strategy: SelectionStrategy,
    #[serde(default)]
    pub filters: ContentFilters,
    /// Items posted within this many days are excluded from selection.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

/// A recurring rule that materializes queue entries over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub owner_id: String,
    /// Inactive schedules are kept but never materialized.
    pub active: bool,
    pub recurrence: Recurrence,
    pub slots: Vec<TimeSlot>,
    /// Day filter; must be non-empty for weekly recurrence.
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    pub source: SourceConfig,
    pub destination_ids: Vec<String>,
    pub max_posts_per_day: u32,
    /// Minimum spacing between posts sharing a destination, in hours.
    pub min_hours_between_posts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether this schedule produces occurrences on the given date.
    pub fn matches_day(&self, date: chrono::NaiveDate) -> bool {
        match self.recurrence {
            Recurrence::Daily => true,
            Recurrence::Weekly => self.days_of_week.contains(&date.weekday()),
            Recurrence::Custom => {
                self.days_of_week.is_empty() || self.days_of_week.contains(&date.weekday())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.destination_ids.is_empty() {
            return Err(ValidationError::EmptyDestinations);
        }
        if self.slots.is_empty() {
            return Err(ValidationError::EmptyTimeSlots);
        }
        if self.recurrence == Recurrence::Weekly && self.days_of_week.is_empty() {
            return Err(ValidationError::EmptyDaysOfWeek);
        }
        if self.max_posts_per_day == 0 {
            return Err(ValidationError::ZeroPostsPerDay);
        }
        for slot in &self.slots {
            slot.validate()?;
        }
        Ok(())
    }
}

/// Early engagement metrics attached to a posting record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub views: u64,
}

impl EngagementMetrics {
    /// Weighted engagement score: likes + 2*comments + 3*shares + 0.1*views.
    pub fn score(&self) -> f64 {
        self.likes as f64
            + self.comments as f64 * 2.0
            + self.shares as f64 * 3.0
            + self.views as f64 * 0.1
    }
}

/// The outcome of dispatching one queue entry to one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingRecord {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub destination_id: String,
    pub success: bool,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub error: Option<String>,
    pub posted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<EngagementMetrics>,
}

impl PostingRecord {
    /// Build a success record for one destination.
    pub fn success(entry_id: Uuid, destination_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_id,
            destination_id: destination_id.to_string(),
            success: true,
            external_post_id: None,
            external_url: None,
            error: None,
            posted_at: now,
            engagement: None,
        }
    }

    /// Build a failure record for one destination.
    pub fn failure(
        entry_id: Uuid,
        destination_id: &str,
        error: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_id,
            destination_id: destination_id.to_string(),
            success: false,
            external_post_id: None,
            external_url: None,
            error: Some(error),
            posted_at: now,
            engagement: None,
        }
    }
}

/// A derived best-time-to-post suggestion for one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalTimeSuggestion {
    pub destination_id: String,
    pub weekday: Weekday,
    pub hour: u8,
    pub score: f64,
}

/// Per-status counts plus a coarse health flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueHealth {
    pub pending: u64,
    pub scheduled: u64,
    pub processing: u64,
    pub posted: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub healthy: bool,
}

impl QueueHealth {
    /// Too many failures or too many entries stuck in flight means unhealthy.
    pub fn evaluate(mut self) -> Self {
        self.healthy = self.failed <= 5 && self.processing <= 10;
        self
    }
}

/// Filters for listing queue entries.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub status: Option<QueueStatus>,
    pub destination_id: Option<String>,
    pub scheduled_after: Option<DateTime<Utc>>,
    pub scheduled_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(status: QueueStatus, scheduled_for: DateTime<Utc>) -> QueueEntry {
        let now = Utc::now();
        QueueEntry {
            id: Uuid::new_v4(),
            owner_id: "owner".to_string(),
            status,
            priority: Priority::Normal,
            content: ContentRef::Inline {
                caption: "hello".to_string(),
                media_urls: vec![],
                hashtags: vec![],
            },
            scheduled_for,
            posted_at: None,
            destination_ids: vec!["dest-1".to_string()],
            attempts: 0,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
            schedule_id: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_source_kind_keys_a_lookup_map() {
        // Source registries key their clients by kind
        let mut sources: HashMap<SourceKind, &str> = HashMap::new();
        sources.insert(SourceKind::Library, "library");
        sources.insert(SourceKind::Upload, "upload");

        assert_eq!(sources.get(&SourceKind::Library), Some(&"library"));
        assert_eq!(sources.get(&SourceKind::External), None);
    }

    #[test]
    fn test_entry_is_due() {
        let now = Utc::now();
        let past = entry(QueueStatus::Scheduled, now - Duration::minutes(1));
        let future = entry(QueueStatus::Scheduled, now + Duration::hours(1));
        let processing = entry(QueueStatus::Processing, now - Duration::minutes(1));

        assert!(past.is_due(now));
        assert!(!future.is_due(now));
        assert!(!processing.is_due(now));
    }

    #[test]
    fn test_entry_with_pending_retry_is_not_due() {
        let now = Utc::now();
        let mut e = entry(QueueStatus::Scheduled, now - Duration::hours(1));
        e.next_retry_at = Some(now + Duration::hours(2));
        assert!(!e.is_due(now));

        e.next_retry_at = Some(now - Duration::minutes(1));
        assert!(e.is_due(now));
    }

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(QueueEntry::retry_delay(1), Duration::hours(2));
        assert_eq!(QueueEntry::retry_delay(2), Duration::hours(4));
        assert_eq!(QueueEntry::retry_delay(3), Duration::hours(8));
    }

    #[test]
    fn test_record_failure_backoff_then_terminal() {
        let now = Utc::now();
        let mut e = entry(QueueStatus::Processing, now - Duration::minutes(5));

        e.record_failure("boom".to_string(), now);
        assert_eq!(e.status, QueueStatus::Scheduled);
        assert_eq!(e.attempts, 1);
        assert_eq!(e.next_retry_at, Some(now + Duration::hours(2)));

        e.record_failure("boom".to_string(), now);
        assert_eq!(e.status, QueueStatus::Scheduled);
        assert_eq!(e.next_retry_at, Some(now + Duration::hours(4)));

        e.record_failure("boom".to_string(), now);
        assert_eq!(e.status, QueueStatus::Failed);
        assert_eq!(e.attempts, MAX_ATTEMPTS);
        assert!(e.next_retry_at.is_none());
    }

    #[test]
    fn test_reset_for_retry_clears_failure_state() {
        let now = Utc::now();
        let mut e = entry(QueueStatus::Processing, now - Duration::hours(10));
        e.record_failure("a".to_string(), now);
        e.record_failure("b".to_string(), now);
        e.record_failure("c".to_string(), now);
        assert_eq!(e.status, QueueStatus::Failed);

        e.reset_for_retry(now);
        assert_eq!(e.status, QueueStatus::Scheduled);
        assert_eq!(e.attempts, 0);
        assert_eq!(e.scheduled_for, now);
        assert!(e.last_error.is_none());
        assert!(e.next_retry_at.is_none());
    }

    #[test]
    fn test_shares_destination() {
        let e = entry(QueueStatus::Scheduled, Utc::now());
        assert!(e.shares_destination(&["dest-1".to_string(), "dest-2".to_string()]));
        assert!(!e.shares_destination(&["dest-9".to_string()]));
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Scheduled,
            QueueStatus::Processing,
            QueueStatus::Posted,
            QueueStatus::Failed,
            QueueStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_time_slot_validation() {
        assert!(TimeSlot::new(9, 0, "America/New_York").validate().is_ok());
        assert!(matches!(
            TimeSlot::new(24, 0, "UTC").validate(),
            Err(ValidationError::HourOutOfRange(24))
        ));
        assert!(matches!(
            TimeSlot::new(9, 60, "UTC").validate(),
            Err(ValidationError::MinuteOutOfRange(60))
        ));
        assert!(matches!(
            TimeSlot::new(9, 0, "Mars/Olympus_Mons").validate(),
            Err(ValidationError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_schedule_weekly_requires_days() {
        let now = Utc::now();
        let mut schedule = Schedule {
            id: Uuid::new_v4(),
            owner_id: "owner".to_string(),
            active: true,
            recurrence: Recurrence::Weekly,
            slots: vec![TimeSlot::new(9, 0, "UTC")],
            days_of_week: vec![],
            source: SourceConfig {
                kind: SourceKind::Library,
                strategy: SelectionStrategy::Random,
                filters: ContentFilters::default(),
                lookback_days: DEFAULT_LOOKBACK_DAYS,
            },
            destination_ids: vec!["dest-1".to_string()],
            max_posts_per_day: 1,
            min_hours_between_posts: 4,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            schedule.validate(),
            Err(ValidationError::EmptyDaysOfWeek)
        ));

        schedule.days_of_week = vec![Weekday::Mon, Weekday::Thu];
        assert!(schedule.validate().is_ok());
    }

    #[test]
    fn test_schedule_matches_day() {
        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            owner_id: "owner".to_string(),
            active: true,
            recurrence: Recurrence::Weekly,
            slots: vec![TimeSlot::new(9, 0, "UTC")],
            days_of_week: vec![Weekday::Mon],
            source: SourceConfig {
                kind: SourceKind::Library,
                strategy: SelectionStrategy::Oldest,
                filters: ContentFilters::default(),
                lookback_days: DEFAULT_LOOKBACK_DAYS,
            },
            destination_ids: vec!["dest-1".to_string()],
            max_posts_per_day: 1,
            min_hours_between_posts: 4,
            created_at: now,
            updated_at: now,
        };

        // 2025-01-06 is a Monday
        let monday = chrono::NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let tuesday = chrono::NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert!(schedule.matches_day(monday));
        assert!(!schedule.matches_day(tuesday));
    }

    #[test]
    fn test_engagement_score_weights() {
        let m = EngagementMetrics {
            likes: 10,
            comments: 5,
            shares: 2,
            views: 100,
        };
        assert!((m.score() - 36.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_content_kind_label() {
        let video = ContentRef::Inline {
            caption: "c".to_string(),
            media_urls: vec!["https://cdn.example/a.mp4".to_string()],
            hashtags: vec![],
        };
        let image = ContentRef::Inline {
            caption: "c".to_string(),
            media_urls: vec!["https://cdn.example/a.png".to_string()],
            hashtags: vec![],
        };
        let text = ContentRef::Inline {
            caption: "c".to_string(),
            media_urls: vec![],
            hashtags: vec![],
        };
        assert_eq!(video.kind_label(), "video");
        assert_eq!(image.kind_label(), "image");
        assert_eq!(text.kind_label(), "text");
    }

    #[test]
    fn test_content_ref_serde_roundtrip() {
        let content = ContentRef::Library {
            source: SourceKind::Library,
            item_id: "item-42".to_string(),
            caption: Some("sunset".to_string()),
            hashtags: vec!["#sky".to_string()],
        };
        let json = serde_json::to_string(&content).unwrap();
        let decoded: ContentRef = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_queue_health_thresholds() {
        let healthy = QueueHealth {
            failed: 5,
            processing: 10,
            ..Default::default()
        }
        .evaluate();
        assert!(healthy.healthy);

        let too_many_failed = QueueHealth {
            failed: 6,
            ..Default::default()
        }
        .evaluate();
        assert!(!too_many_failed.healthy);

        let stuck_in_flight = QueueHealth {
            processing: 11,
            ..Default::default()
        }
        .evaluate();
        assert!(!stuck_in_flight.healthy);
    }
}
