//! SQLite persistence for queue entries, schedules, and posting records.
//!
//! The store is the single shared mutable resource in the system. All
//! multi-step mutations (conflict-check + insert, compare-and-set status
//! transitions) run under the connection mutex and are therefore atomic with
//! respect to concurrent callers.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    ContentRef, EntryFilter, PostingRecord, Priority, QueueEntry, QueueHealth, QueueStatus,
    Schedule,
};

/// SQLite-backed queue store.
pub struct QueueStore {
    conn: Mutex<Connection>,
}

/// Raw queue entry row, straight from SQLite columns.
struct EntryRow {
    id: String,
    owner_id: String,
    status: String,
    priority: String,
    content: String,
    scheduled_for: String,
    posted_at: Option<String>,
    destination_ids: String,
    attempts: u32,
    last_attempt_at: Option<String>,
    next_retry_at: Option<String>,
    last_error: Option<String>,
    schedule_id: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

/// Raw schedule row.
struct ScheduleRow {
    id: String,
    owner_id: String,
    active: bool,
    recurrence: String,
    slots: String,
    days_of_week: String,
    source: String,
    destination_ids: String,
    max_posts_per_day: u32,
    min_hours_between_posts: i64,
    created_at: String,
    updated_at: String,
}

/// Raw posting record row.
struct RecordRow {
    id: String,
    entry_id: String,
    destination_id: String,
    success: bool,
    external_post_id: Option<String>,
    external_url: Option<String>,
    error: Option<String>,
    posted_at: String,
    engagement: Option<String>,
}

/// Format a timestamp with a fixed fractional width so string comparison in
/// SQL matches chronological order. Full nanosecond precision, so values
/// round-trip equal through the store.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Timestamp(format!("{s}: {e}")))
}

fn parse_opt_ts(s: Option<&str>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(parse_ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::EnumTag(format!("invalid uuid {s}: {e}")))
}

const ENTRY_COLUMNS: &str = "id, owner_id, status, priority, content, scheduled_for, posted_at, \
     destination_ids, attempts, last_attempt_at, next_retry_at, last_error, schedule_id, \
     metadata, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "id, owner_id, active, recurrence, slots, days_of_week, source, \
     destination_ids, max_posts_per_day, min_hours_between_posts, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, entry_id, destination_id, success, external_post_id, \
     external_url, error, posted_at, engagement";

impl QueueStore {
    /// Open or create the SQLite database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened queue store");
        Self::init(conn)
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS queue_entries (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'normal',
                content TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                posted_at TEXT,
                destination_ids TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_attempt_at TEXT,
                next_retry_at TEXT,
                last_error TEXT,
                schedule_id TEXT,
                metadata TEXT NOT NULL DEFAULT 'null',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_owner_status
                ON queue_entries(owner_id, status);
            CREATE INDEX IF NOT EXISTS idx_entries_due
                ON queue_entries(status, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_entries_schedule
                ON queue_entries(schedule_id, scheduled_for);

            CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                recurrence TEXT NOT NULL,
                slots TEXT NOT NULL,
                days_of_week TEXT NOT NULL DEFAULT '[]',
                source TEXT NOT NULL,
                destination_ids TEXT NOT NULL,
                max_posts_per_day INTEGER NOT NULL,
                min_hours_between_posts INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_schedules_owner ON schedules(owner_id);

            CREATE TABLE IF NOT EXISTS posting_records (
                id TEXT PRIMARY KEY,
                entry_id TEXT NOT NULL,
                destination_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                external_post_id TEXT,
                external_url TEXT,
                error TEXT,
                posted_at TEXT NOT NULL,
                engagement TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_records_entry ON posting_records(entry_id);
            CREATE INDEX IF NOT EXISTS idx_records_posted_at ON posting_records(posted_at);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // === Queue entries ===

    /// Insert an entry after checking the destination conflict window.
    ///
    /// The check and the insert run under one connection lock, so two
    /// concurrent callers cannot both pass the check and both insert.
    pub fn insert_entry_checked(
        &self,
        entry: &QueueEntry,
        window: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::check_conflict_locked(&conn, entry, None, window)?;
        Self::insert_entry_locked(&conn, entry)
    }

    /// Update all mutable columns of an entry, optionally re-running the
    /// conflict check (excluding the entry itself).
    pub fn update_entry_checked(
        &self,
        entry: &QueueEntry,
        check_conflict: bool,
        window: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        if check_conflict {
            Self::check_conflict_locked(&conn, entry, Some(entry.id), window)?;
        }
        Self::update_entry_locked(&conn, entry)
    }

    /// Update all mutable columns of an entry without a conflict check.
    pub fn update_entry(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::update_entry_locked(&conn, entry)
    }

    fn insert_entry_locked(conn: &Connection, entry: &QueueEntry) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO queue_entries (id, owner_id, status, priority, content, scheduled_for, \
             posted_at, destination_ids, attempts, last_attempt_at, next_retry_at, last_error, \
             schedule_id, metadata, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                entry.id.to_string(),
                entry.owner_id,
                entry.status.as_str(),
                entry.priority.as_str(),
                serde_json::to_string(&entry.content)?,
                ts(entry.scheduled_for),
                entry.posted_at.map(ts),
                serde_json::to_string(&entry.destination_ids)?,
                entry.attempts,
                entry.last_attempt_at.map(ts),
                entry.next_retry_at.map(ts),
                entry.last_error,
                entry.schedule_id.map(|id| id.to_string()),
                serde_json::to_string(&entry.metadata)?,
                ts(entry.created_at),
                ts(entry.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_entry_locked(conn: &Connection, entry: &QueueEntry) -> Result<(), StoreError> {
        conn.execute(
            "UPDATE queue_entries SET status = ?2, priority = ?3, content = ?4, \
             scheduled_for = ?5, posted_at = ?6, destination_ids = ?7, attempts = ?8, \
             last_attempt_at = ?9, next_retry_at = ?10, last_error = ?11, metadata = ?12, \
             updated_at = ?13 WHERE id = ?1",
            params![
                entry.id.to_string(),
                entry.status.as_str(),
                entry.priority.as_str(),
                serde_json::to_string(&entry.content)?,
                ts(entry.scheduled_for),
                entry.posted_at.map(ts),
                serde_json::to_string(&entry.destination_ids)?,
                entry.attempts,
                entry.last_attempt_at.map(ts),
                entry.next_retry_at.map(ts),
                entry.last_error,
                serde_json::to_string(&entry.metadata)?,
                ts(entry.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Scan for an entry in {scheduled, processing} that shares a destination
    /// with `entry` and lies strictly within `window` of its scheduled time.
    /// A spacing of exactly `window` is legal.
    fn check_conflict_locked(
        conn: &Connection,
        entry: &QueueEntry,
        exclude: Option<Uuid>,
        window: Duration,
    ) -> Result<(), StoreError> {
        let from = ts(entry.scheduled_for - window);
        let to = ts(entry.scheduled_for + window);

        let mut stmt = conn.prepare(
            "SELECT id, scheduled_for, destination_ids FROM queue_entries \
             WHERE owner_id = ?1 AND status IN ('scheduled', 'processing') \
             AND scheduled_for > ?2 AND scheduled_for < ?3",
        )?;
        let rows = stmt.query_map(params![entry.owner_id, from, to], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        for row in rows {
            let (id, scheduled_for, destinations) = row?;
            let id = parse_uuid(&id)?;
            if exclude == Some(id) {
                continue;
            }
            let destinations: Vec<String> = serde_json::from_str(&destinations)?;
            if entry.shares_destination(&destinations) {
                return Err(StoreError::Conflict {
                    existing: id,
                    existing_time: parse_ts(&scheduled_for)?,
                });
            }
        }
        Ok(())
    }

    /// Probe for conflicts around an instant without inserting anything.
    ///
    /// Returns the ids of conflicting entries, if any.
    pub fn conflicting_entries(
        &self,
        owner_id: &str,
        instant: DateTime<Utc>,
        destination_ids: &[String],
        window: Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let from = ts(instant - window);
        let to = ts(instant + window);

        let mut stmt = conn.prepare(
            "SELECT id, destination_ids FROM queue_entries \
             WHERE owner_id = ?1 AND status IN ('scheduled', 'processing') \
             AND scheduled_for > ?2 AND scheduled_for < ?3",
        )?;
        let rows = stmt.query_map(params![owner_id, from, to], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let wanted: HashSet<&str> = destination_ids.iter().map(String::as_str).collect();
        let mut conflicts = Vec::new();
        for row in rows {
            let (id, destinations) = row?;
            let destinations: Vec<String> = serde_json::from_str(&destinations)?;
            if destinations.iter().any(|d| wanted.contains(d.as_str())) {
                conflicts.push(parse_uuid(&id)?);
            }
        }
        Ok(conflicts)
    }

    /// Fetch one entry scoped by owner.
    pub fn get_entry(&self, owner_id: &str, id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = ?1 AND owner_id = ?2"),
                params![id.to_string(), owner_id],
                Self::map_entry_row,
            )
            .optional()?;
        row.map(Self::entry_from_row).transpose()
    }

    /// Fetch one entry by id regardless of owner. Used by the processor.
    pub fn get_entry_by_id(&self, id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = ?1"),
                params![id.to_string()],
                Self::map_entry_row,
            )
            .optional()?;
        row.map(Self::entry_from_row).transpose()
    }

    /// Compare-and-set an entry's status. Returns false if the entry was not
    /// in the expected status, guarding against double pickup.
    pub fn set_status_if(
        &self,
        id: Uuid,
        expected: QueueStatus,
        next: QueueStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE queue_entries SET status = ?3, updated_at = ?4 \
             WHERE id = ?1 AND status = ?2",
            params![id.to_string(), expected.as_str(), next.as_str(), ts(now)],
        )?;
        Ok(changed == 1)
    }

    /// List an owner's entries, newest-first by scheduled time, with filters.
    pub fn list_entries(
        &self,
        owner_id: &str,
        filter: &EntryFilter,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE owner_id = ?1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner_id.to_string())];

        if let Some(status) = filter.status {
            args.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(after) = filter.scheduled_after {
            args.push(Box::new(ts(after)));
            sql.push_str(&format!(" AND scheduled_for >= ?{}", args.len()));
        }
        if let Some(before) = filter.scheduled_before {
            args.push(Box::new(ts(before)));
            sql.push_str(&format!(" AND scheduled_for <= ?{}", args.len()));
        }
        sql.push_str(" ORDER BY scheduled_for ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            Self::map_entry_row,
        )?;

        let mut entries = Vec::new();
        for row in rows {
            let entry = Self::entry_from_row(row?)?;
            // Destination filtering happens here; the column is a JSON array.
            if let Some(dest) = &filter.destination_id {
                if !entry.destination_ids.contains(dest) {
                    continue;
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Fetch up to `limit` due entries (scheduled, past their time, and past
    /// any pending retry delay), oldest first.
    pub fn due_entries(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        // Higher priority wins ties between entries due at the same time
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE status = 'scheduled' AND scheduled_for <= ?1 \
             AND (next_retry_at IS NULL OR next_retry_at <= ?1) \
             ORDER BY scheduled_for ASC, \
             CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END ASC \
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![ts(now), limit], Self::map_entry_row)?;
        rows.map(|r| Self::entry_from_row(r?)).collect()
    }

    /// Entries in the given window that still occupy queue capacity
    /// (pending, scheduled, or processing).
    pub fn entries_scheduled_between(
        &self,
        owner_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE owner_id = ?1 AND status IN ('pending', 'scheduled', 'processing') \
             AND scheduled_for >= ?2 AND scheduled_for < ?3 \
             ORDER BY scheduled_for ASC"
        ))?;
        let rows = stmt.query_map(params![owner_id, ts(from), ts(to)], Self::map_entry_row)?;
        rows.map(|r| Self::entry_from_row(r?)).collect()
    }

    /// Count a schedule's live entries in the given window.
    pub fn count_entries_for_schedule(
        &self,
        schedule_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_entries \
             WHERE schedule_id = ?1 AND status IN ('pending', 'scheduled', 'processing') \
             AND scheduled_for >= ?2 AND scheduled_for < ?3",
            params![schedule_id.to_string(), ts(from), ts(to)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Per-status entry counts for one owner.
    pub fn counts_by_status(&self, owner_id: &str) -> Result<QueueHealth, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM queue_entries WHERE owner_id = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut health = QueueHealth::default();
        for row in rows {
            let (status, count) = row?;
            match QueueStatus::from_str(&status).map_err(StoreError::EnumTag)? {
                QueueStatus::Pending => health.pending = count,
                QueueStatus::Scheduled => health.scheduled = count,
                QueueStatus::Processing => health.processing = count,
                QueueStatus::Posted => health.posted = count,
                QueueStatus::Failed => health.failed = count,
                QueueStatus::Cancelled => health.cancelled = count,
            }
        }
        Ok(health)
    }

    /// Library item ids the owner has posted since `since`. Drives the
    /// content selector's de-duplication window.
    pub fn recently_posted_item_ids(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT content FROM queue_entries \
             WHERE owner_id = ?1 AND status = 'posted' AND posted_at >= ?2",
        )?;
        let rows = stmt.query_map(params![owner_id, ts(since)], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            let content: ContentRef = serde_json::from_str(&row?)?;
            if let Some(item_id) = content.item_id() {
                ids.insert(item_id.to_string());
            }
        }
        Ok(ids)
    }

    /// Hard-delete cancelled entries older than `cutoff`. Returns the count.
    pub fn delete_cancelled_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "DELETE FROM queue_entries WHERE status = 'cancelled' AND updated_at < ?1",
            params![ts(cutoff)],
        )?)
    }

    /// Hard-delete posted entries older than `cutoff`. Posting records are
    /// kept; analytics history survives entry cleanup.
    pub fn delete_posted_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "DELETE FROM queue_entries WHERE status = 'posted' AND posted_at < ?1",
            params![ts(cutoff)],
        )?)
    }

    fn map_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
        Ok(EntryRow {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            status: row.get(2)?,
            priority: row.get(3)?,
            content: row.get(4)?,
            scheduled_for: row.get(5)?,
            posted_at: row.get(6)?,
            destination_ids: row.get(7)?,
            attempts: row.get(8)?,
            last_attempt_at: row.get(9)?,
            next_retry_at: row.get(10)?,
            last_error: row.get(11)?,
            schedule_id: row.get(12)?,
            metadata: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn entry_from_row(row: EntryRow) -> Result<QueueEntry, StoreError> {
        Ok(QueueEntry {
            id: parse_uuid(&row.id)?,
            owner_id: row.owner_id,
            status: QueueStatus::from_str(&row.status).map_err(StoreError::EnumTag)?,
            priority: Priority::from_str(&row.priority).map_err(StoreError::EnumTag)?,
            content: serde_json::from_str(&row.content)?,
            scheduled_for: parse_ts(&row.scheduled_for)?,
            posted_at: parse_opt_ts(row.posted_at.as_deref())?,
            destination_ids: serde_json::from_str(&row.destination_ids)?,
            attempts: row.attempts,
            last_attempt_at: parse_opt_ts(row.last_attempt_at.as_deref())?,
            next_retry_at: parse_opt_ts(row.next_retry_at.as_deref())?,
            last_error: row.last_error,
            schedule_id: row.schedule_id.as_deref().map(parse_uuid).transpose()?,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }

    // === Schedules ===

    pub fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO schedules (id, owner_id, active, recurrence, slots, days_of_week, \
             source, destination_ids, max_posts_per_day, min_hours_between_posts, created_at, \
             updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                schedule.id.to_string(),
                schedule.owner_id,
                schedule.active,
                serde_json::to_string(&schedule.recurrence)?,
                serde_json::to_string(&schedule.slots)?,
                serde_json::to_string(&schedule.days_of_week)?,
                serde_json::to_string(&schedule.source)?,
                serde_json::to_string(&schedule.destination_ids)?,
                schedule.max_posts_per_day,
                schedule.min_hours_between_posts,
                ts(schedule.created_at),
                ts(schedule.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE schedules SET active = ?2, recurrence = ?3, slots = ?4, days_of_week = ?5, \
             source = ?6, destination_ids = ?7, max_posts_per_day = ?8, \
             min_hours_between_posts = ?9, updated_at = ?10 WHERE id = ?1",
            params![
                schedule.id.to_string(),
                schedule.active,
                serde_json::to_string(&schedule.recurrence)?,
                serde_json::to_string(&schedule.slots)?,
                serde_json::to_string(&schedule.days_of_week)?,
                serde_json::to_string(&schedule.source)?,
                serde_json::to_string(&schedule.destination_ids)?,
                schedule.max_posts_per_day,
                schedule.min_hours_between_posts,
                ts(schedule.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_schedule(&self, owner_id: &str, id: Uuid) -> Result<Option<Schedule>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1 AND owner_id = ?2"),
                params![id.to_string(), owner_id],
                Self::map_schedule_row,
            )
            .optional()?;
        row.map(Self::schedule_from_row).transpose()
    }

    /// Delete a schedule. Returns false when no row matched.
    pub fn delete_schedule(&self, owner_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM schedules WHERE id = ?1 AND owner_id = ?2",
            params![id.to_string(), owner_id],
        )?;
        Ok(changed == 1)
    }

    pub fn list_schedules(&self, owner_id: &str) -> Result<Vec<Schedule>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE owner_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![owner_id], Self::map_schedule_row)?;
        rows.map(|r| Self::schedule_from_row(r?)).collect()
    }

    /// All active schedules, across owners. Drives materialization.
    pub fn list_active_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE active = 1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], Self::map_schedule_row)?;
        rows.map(|r| Self::schedule_from_row(r?)).collect()
    }

    fn map_schedule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRow> {
        Ok(ScheduleRow {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            active: row.get(2)?,
            recurrence: row.get(3)?,
            slots: row.get(4)?,
            days_of_week: row.get(5)?,
            source: row.get(6)?,
            destination_ids: row.get(7)?,
            max_posts_per_day: row.get(8)?,
            min_hours_between_posts: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn schedule_from_row(row: ScheduleRow) -> Result<Schedule, StoreError> {
        Ok(Schedule {
            id: parse_uuid(&row.id)?,
            owner_id: row.owner_id,
            active: row.active,
            recurrence: serde_json::from_str(&row.recurrence)?,
            slots: serde_json::from_str(&row.slots)?,
            days_of_week: serde_json::from_str(&row.days_of_week)?,
            source: serde_json::from_str(&row.source)?,
            destination_ids: serde_json::from_str(&row.destination_ids)?,
            max_posts_per_day: row.max_posts_per_day,
            min_hours_between_posts: row.min_hours_between_posts,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }

    // === Posting records ===

    pub fn insert_record(&self, record: &PostingRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO posting_records (id, entry_id, destination_id, success, \
             external_post_id, external_url, error, posted_at, engagement) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.entry_id.to_string(),
                record.destination_id,
                record.success,
                record.external_post_id,
                record.external_url,
                record.error,
                ts(record.posted_at),
                record
                    .engagement
                    .map(|e| serde_json::to_string(&e))
                    .transpose()?,
            ],
        )?;
        Ok(())
    }

    pub fn records_for_entry(&self, entry_id: Uuid) -> Result<Vec<PostingRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM posting_records WHERE entry_id = ?1 \
             ORDER BY posted_at ASC"
        ))?;
        let rows = stmt.query_map(params![entry_id.to_string()], Self::map_record_row)?;
        rows.map(|r| Self::record_from_row(r?)).collect()
    }

    /// An owner's posting records in `[start, end)`, joined through entries.
    pub fn records_between(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PostingRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.entry_id, r.destination_id, r.success, r.external_post_id, \
             r.external_url, r.error, r.posted_at, r.engagement \
             FROM posting_records r JOIN queue_entries e ON e.id = r.entry_id \
             WHERE e.owner_id = ?1 AND r.posted_at >= ?2 AND r.posted_at < ?3 \
             ORDER BY r.posted_at ASC",
        )?;
        let rows = stmt.query_map(params![owner_id, ts(start), ts(end)], Self::map_record_row)?;
        rows.map(|r| Self::record_from_row(r?)).collect()
    }

    /// Successful records with engagement data since `since`, paired with the
    /// scheduled time of their originating entry. Feeds optimal-time scoring.
    pub fn engagement_history(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(PostingRecord, DateTime<Utc>)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.entry_id, r.destination_id, r.success, r.external_post_id, \
             r.external_url, r.error, r.posted_at, r.engagement, e.scheduled_for \
             FROM posting_records r JOIN queue_entries e ON e.id = r.entry_id \
             WHERE e.owner_id = ?1 AND r.success = 1 AND r.engagement IS NOT NULL \
             AND r.posted_at >= ?2",
        )?;
        let rows = stmt.query_map(params![owner_id, ts(since)], |row| {
            Ok((Self::map_record_row(row)?, row.get::<_, String>(9)?))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (record, scheduled_for) = row?;
            history.push((Self::record_from_row(record)?, parse_ts(&scheduled_for)?));
        }
        Ok(history)
    }

    /// Records since `since` paired with the content of their entry. Feeds
    /// the content-performance report.
    pub fn records_with_content(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(PostingRecord, ContentRef)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.entry_id, r.destination_id, r.success, r.external_post_id, \
             r.external_url, r.error, r.posted_at, r.engagement, e.content \
             FROM posting_records r JOIN queue_entries e ON e.id = r.entry_id \
             WHERE e.owner_id = ?1 AND r.posted_at >= ?2",
        )?;
        let rows = stmt.query_map(params![owner_id, ts(since)], |row| {
            Ok((Self::map_record_row(row)?, row.get::<_, String>(9)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (record, content) = row?;
            result.push((
                Self::record_from_row(record)?,
                serde_json::from_str(&content)?,
            ));
        }
        Ok(result)
    }

    /// An owner's entries created in `[start, end)`. Feeds daily aggregation.
    pub fn entries_created_between(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM queue_entries \
             WHERE owner_id = ?1 AND created_at >= ?2 AND created_at < ?3 \
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![owner_id, ts(start), ts(end)], Self::map_entry_row)?;
        rows.map(|r| Self::entry_from_row(r?)).collect()
    }

    fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
        Ok(RecordRow {
            id: row.get(0)?,
            entry_id: row.get(1)?,
            destination_id: row.get(2)?,
            success: row.get(3)?,
            external_post_id: row.get(4)?,
            external_url: row.get(5)?,
            error: row.get(6)?,
            posted_at: row.get(7)?,
            engagement: row.get(8)?,
        })
    }

    fn record_from_row(row: RecordRow) -> Result<PostingRecord, StoreError> {
        Ok(PostingRecord {
            id: parse_uuid(&row.id)?,
            entry_id: parse_uuid(&row.entry_id)?,
            destination_id: row.destination_id,
            success: row.success,
            external_post_id: row.external_post_id,
            external_url: row.external_url,
            error: row.error,
            posted_at: parse_ts(&row.posted_at)?,
            engagement: row
                .engagement
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}
