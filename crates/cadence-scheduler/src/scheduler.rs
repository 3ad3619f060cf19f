//! Schedule CRUD and recurring-schedule expansion.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use chrono::offset::LocalResult;
use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use cadence_analytics::AnalyticsEngine;
use cadence_store::{QueueStore, Schedule, SourceConfig, TimeSlot};

use crate::error::SchedulerError;

/// A draft schedule, before validation and id assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default = "default_active")]
    pub active: bool,
    pub recurrence: cadence_store::Recurrence,
    pub slots: Vec<TimeSlot>,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    pub source: SourceConfig,
    pub destination_ids: Vec<String>,
    pub max_posts_per_day: u32,
    pub min_hours_between_posts: i64,
}

fn default_active() -> bool {
    true
}

/// A posting instant accepted by schedule materialization. The content is
/// filled in later by the content selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedPost {
    pub schedule_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub destination_ids: Vec<String>,
}

/// Expand a schedule into concrete UTC instants.
///
/// For each calendar day in `[from, from + days)` that passes the recurrence
/// filter, each slot's wall-clock time is converted from its timezone to UTC.
/// Instants at or before `now` are dropped. DST gaps produce no instant for
/// that slot that day; ambiguous fall-back times resolve to the earlier
/// offset. Output is sorted ascending.
pub fn occurrences(
    schedule: &Schedule,
    from: DateTime<Utc>,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, SchedulerError> {
    let mut out = Vec::new();
    for offset in 0..days {
        let date = (from + Duration::days(i64::from(offset))).date_naive();
        if !schedule.matches_day(date) {
            continue;
        }
        for slot in &schedule.slots {
            let tz = slot.tz()?;
            let Some(naive) =
                date.and_hms_opt(u32::from(slot.hour), u32::from(slot.minute), 0)
            else {
                continue;
            };
            let local = match tz.from_local_datetime(&naive) {
                LocalResult::Single(t) => t,
                LocalResult::Ambiguous(earlier, _) => earlier,
                LocalResult::None => {
                    debug!(%date, hour = slot.hour, tz = %slot.timezone, "slot falls in DST gap");
                    continue;
                }
            };
            let instant = local.with_timezone(&Utc);
            if instant > now {
                out.push(instant);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Schedule CRUD plus expansion into conflict-free posting instants.
pub struct Scheduler {
    store: Arc<QueueStore>,
    analytics: Arc<AnalyticsEngine>,
}

impl Scheduler {
    pub fn new(store: Arc<QueueStore>, analytics: Arc<AnalyticsEngine>) -> Self {
        Self { store, analytics }
    }

    pub fn create_schedule(
        &self,
        owner_id: &str,
        request: ScheduleRequest,
    ) -> Result<Schedule, SchedulerError> {
        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            active: request.active,
            recurrence: request.recurrence,
            slots: request.slots,
            days_of_week: request.days_of_week,
            source: request.source,
            destination_ids: request.destination_ids,
            max_posts_per_day: request.max_posts_per_day,
            min_hours_between_posts: request.min_hours_between_posts,
            created_at: now,
            updated_at: now,
        };
        schedule.validate()?;
        self.store.insert_schedule(&schedule)?;
        info!(schedule_id = %schedule.id, owner = %owner_id, "created schedule");
        Ok(schedule)
    }

    pub fn update_schedule(
        &self,
        owner_id: &str,
        id: Uuid,
        request: ScheduleRequest,
    ) -> Result<Schedule, SchedulerError> {
        let mut schedule = self
            .store
            .get_schedule(owner_id, id)?
            .ok_or(SchedulerError::NotFound(id))?;

        schedule.active = request.active;
        schedule.recurrence = request.recurrence;
        schedule.slots = request.slots;
        schedule.days_of_week = request.days_of_week;
        schedule.source = request.source;
        schedule.destination_ids = request.destination_ids;
        schedule.max_posts_per_day = request.max_posts_per_day;
        schedule.min_hours_between_posts = request.min_hours_between_posts;
        schedule.updated_at = Utc::now();

        schedule.validate()?;
        self.store.update_schedule(&schedule)?;
        info!(schedule_id = %id, "updated schedule");
        Ok(schedule)
    }

    /// Activate or deactivate a schedule without touching its definition.
    pub fn toggle(&self, owner_id: &str, id: Uuid, active: bool) -> Result<Schedule, SchedulerError> {
        let mut schedule = self
            .store
            .get_schedule(owner_id, id)?
            .ok_or(SchedulerError::NotFound(id))?;
        schedule.active = active;
        schedule.updated_at = Utc::now();
        self.store.update_schedule(&schedule)?;
        info!(schedule_id = %id, active, "toggled schedule");
        Ok(schedule)
    }

    pub fn delete_schedule(&self, owner_id: &str, id: Uuid) -> Result<(), SchedulerError> {
        if !self.store.delete_schedule(owner_id, id)? {
            return Err(SchedulerError::NotFound(id));
        }
        info!(schedule_id = %id, "deleted schedule");
        Ok(())
    }

    pub fn get_schedule(&self, owner_id: &str, id: Uuid) -> Result<Schedule, SchedulerError> {
        self.store
            .get_schedule(owner_id, id)?
            .ok_or(SchedulerError::NotFound(id))
    }

    pub fn list_schedules(&self, owner_id: &str) -> Result<Vec<Schedule>, SchedulerError> {
        Ok(self.store.list_schedules(owner_id)?)
    }

    /// Expand a schedule into accepted posting instants over the next `days`
    /// days.
    ///
    /// Instants are accepted greedily, subject to two constraints evaluated
    /// against both existing live entries and instants already accepted in
    /// this batch: the per-calendar-day cap, and the minimum spacing between
    /// posts whose destination sets overlap. Rejected instants are dropped,
    /// not rescheduled.
    pub fn generate_queue_items(
        &self,
        schedule: &Schedule,
        days: u32,
    ) -> Result<Vec<PlannedPost>, SchedulerError> {
        self.plan(schedule, Utc::now(), days)
    }

    /// Side-effect-free expansion of a stored schedule, for inspection.
    pub fn preview(
        &self,
        owner_id: &str,
        id: Uuid,
        days: u32,
    ) -> Result<Vec<PlannedPost>, SchedulerError> {
        let schedule = self.get_schedule(owner_id, id)?;
        self.plan(&schedule, Utc::now(), days)
    }

    fn plan(
        &self,
        schedule: &Schedule,
        now: DateTime<Utc>,
        days: u32,
    ) -> Result<Vec<PlannedPost>, SchedulerError> {
        schedule.validate()?;
        let candidates = occurrences(schedule, now, days, now)?;

        // Existing live entries with an overlapping destination set count
        // against both the day cap and the spacing constraint.
        let horizon_end = now + Duration::days(i64::from(days));
        let existing: Vec<DateTime<Utc>> = self
            .store
            .entries_scheduled_between(&schedule.owner_id, now, horizon_end)?
            .into_iter()
            .filter(|e| e.shares_destination(&schedule.destination_ids))
            .map(|e| e.scheduled_for)
            .collect();

        let min_gap = Duration::hours(schedule.min_hours_between_posts);
        let mut per_day: HashMap<NaiveDate, u32> = HashMap::new();
        for t in &existing {
            *per_day.entry(t.date_naive()).or_default() += 1;
        }
        let mut taken: Vec<DateTime<Utc>> = existing;

        let mut accepted = Vec::new();
        for instant in candidates {
            let day = instant.date_naive();
            if per_day.get(&day).copied().unwrap_or(0) >= schedule.max_posts_per_day {
                debug!(%instant, "dropped occurrence: day cap reached");
                continue;
            }
            let too_close = taken
                .iter()
                .any(|t| (instant - *t).abs() < min_gap);
            if too_close {
                debug!(%instant, "dropped occurrence: within minimum spacing");
                continue;
            }

            *per_day.entry(day).or_default() += 1;
            taken.push(instant);
            accepted.push(PlannedPost {
                schedule_id: schedule.id,
                scheduled_for: instant,
                destination_ids: schedule.destination_ids.clone(),
            });
        }

        debug!(
            schedule_id = %schedule.id,
            accepted = accepted.len(),
            "expanded schedule"
        );
        Ok(accepted)
    }

    /// Probe whether a planned slot would collide with existing entries,
    /// without booking anything. Returns the conflicting entry ids.
    pub fn check_conflicts(
        &self,
        owner_id: &str,
        instant: DateTime<Utc>,
        destination_ids: &[String],
    ) -> Result<Vec<Uuid>, SchedulerError> {
        Ok(self.store.conflicting_entries(
            owner_id,
            instant,
            destination_ids,
            Duration::minutes(cadence_store::CONFLICT_WINDOW_MINUTES),
        )?)
    }

    /// Best posting times for an owner, as wall-clock slots.
    ///
    /// Backed by the analytics engine's optimal-time scoring, which itself
    /// falls back to static per-platform tables when history is missing or
    /// the query fails. Suggestions are UTC-hour based, so slots come back
    /// in UTC.
    pub fn find_optimal_times(&self, owner_id: &str, destination_id: Option<&str>) -> Vec<TimeSlot> {
        let suggestions = self.analytics.optimal_times(owner_id, destination_id);

        let mut slots: Vec<TimeSlot> = Vec::new();
        for suggestion in suggestions {
            let slot = TimeSlot::new(suggestion.hour, 0, "UTC");
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
        slots.truncate(4);
        slots
    }
}
