//! Queue entry CRUD and the scheduling-conflict invariant.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_store::{
    CONFLICT_WINDOW_MINUTES, EntryFilter, QueueEntry, QueueEntryPatch, QueueEntryRequest,
    QueueHealth, QueueStatus, QueueStore, ValidationError,
};

use crate::error::QueueError;

/// Manages queue entries: creation, edits, cancellation, retries, and health.
///
/// All operations are owner-scoped. The conflict invariant (no two live
/// entries sharing a destination within ±30 minutes) is enforced atomically
/// through the store's checked insert/update.
pub struct QueueManager {
    store: Arc<QueueStore>,
}

impl QueueManager {
    pub fn new(store: Arc<QueueStore>) -> Self {
        Self { store }
    }

    fn conflict_window() -> Duration {
        Duration::minutes(CONFLICT_WINDOW_MINUTES)
    }

    /// Create a new queue entry.
    ///
    /// Fails with `InvalidSchedule` when the scheduled time is not in the
    /// future or the destination set is empty, and with `SchedulingConflict`
    /// when a live entry sharing a destination sits within the conflict
    /// window. The conflict check and insert are atomic.
    pub fn add(&self, owner_id: &str, request: QueueEntryRequest) -> Result<QueueEntry, QueueError> {
        let now = Utc::now();
        if request.scheduled_for <= now {
            return Err(ValidationError::ScheduledInPast(request.scheduled_for).into());
        }
        if request.destination_ids.is_empty() {
            return Err(ValidationError::EmptyDestinations.into());
        }

        let entry = QueueEntry {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            status: QueueStatus::Scheduled,
            priority: request.priority,
            content: request.content,
            scheduled_for: request.scheduled_for,
            posted_at: None,
            destination_ids: request.destination_ids,
            attempts: 0,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
            schedule_id: request.schedule_id,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert_entry_checked(&entry, Self::conflict_window())?;
        info!(
            entry_id = %entry.id,
            owner = %owner_id,
            scheduled_for = %entry.scheduled_for,
            destinations = entry.destination_ids.len(),
            "queued entry"
        );
        Ok(entry)
    }

    /// Apply a partial update. Re-runs the conflict check (excluding the
    /// entry itself) whenever the scheduled time changes.
    pub fn update(
        &self,
        owner_id: &str,
        id: Uuid,
        patch: QueueEntryPatch,
    ) -> Result<QueueEntry, QueueError> {
        let mut entry = self
            .store
            .get_entry(owner_id, id)?
            .ok_or(QueueError::NotFound(id))?;

        let reschedule = patch
            .scheduled_for
            .is_some_and(|t| t != entry.scheduled_for);
        if let Some(scheduled_for) = patch.scheduled_for {
            if scheduled_for <= Utc::now() {
                return Err(ValidationError::ScheduledInPast(scheduled_for).into());
            }
            entry.scheduled_for = scheduled_for;
        }
        if let Some(destination_ids) = patch.destination_ids {
            if destination_ids.is_empty() {
                return Err(ValidationError::EmptyDestinations.into());
            }
            entry.destination_ids = destination_ids;
        }
        if let Some(content) = patch.content {
            entry.content = content;
        }
        if let Some(priority) = patch.priority {
            entry.priority = priority;
        }
        if let Some(metadata) = patch.metadata {
            entry.metadata = metadata;
        }
        entry.updated_at = Utc::now();

        self.store
            .update_entry_checked(&entry, reschedule, Self::conflict_window())?;
        debug!(entry_id = %id, rescheduled = reschedule, "updated entry");
        Ok(entry)
    }

    /// Cancel an entry. Only pending and scheduled entries can be cancelled;
    /// anything else reports `NotFound`.
    pub fn remove(&self, owner_id: &str, id: Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self
            .store
            .get_entry(owner_id, id)?
            .ok_or(QueueError::NotFound(id))?;
        if !entry.status.cancellable() {
            return Err(QueueError::NotFound(id));
        }

        entry.status = QueueStatus::Cancelled;
        entry.updated_at = Utc::now();
        self.store.update_entry(&entry)?;
        info!(entry_id = %id, "cancelled entry");
        Ok(entry)
    }

    /// Reset a failed entry for an immediate new round of attempts.
    pub fn retry(&self, owner_id: &str, id: Uuid) -> Result<QueueEntry, QueueError> {
        let mut entry = self
            .store
            .get_entry(owner_id, id)?
            .ok_or(QueueError::NotFound(id))?;
        if entry.status != QueueStatus::Failed {
            return Err(QueueError::NotFound(id));
        }

        entry.reset_for_retry(Utc::now());
        self.store.update_entry(&entry)?;
        info!(entry_id = %id, "reset failed entry for retry");
        Ok(entry)
    }

    /// Best-effort bulk status change. Entries not in an eligible source
    /// status are silently skipped. Returns the number updated.
    ///
    /// Targets: `Cancelled` (from pending/scheduled) and `Scheduled` (from
    /// pending/cancelled/failed; failed entries get the retry reset).
    pub fn bulk_set_status(
        &self,
        owner_id: &str,
        ids: &[Uuid],
        target: QueueStatus,
    ) -> Result<usize, QueueError> {
        if !matches!(target, QueueStatus::Cancelled | QueueStatus::Scheduled) {
            return Err(QueueError::UnsupportedBulkStatus(target));
        }

        let now = Utc::now();
        let mut updated = 0;
        for &id in ids {
            let Some(mut entry) = self.store.get_entry(owner_id, id)? else {
                continue;
            };
            let eligible = match target {
                QueueStatus::Cancelled => entry.status.cancellable(),
                QueueStatus::Scheduled => matches!(
                    entry.status,
                    QueueStatus::Pending | QueueStatus::Cancelled | QueueStatus::Failed
                ),
                _ => unreachable!(),
            };
            if !eligible {
                debug!(entry_id = %id, status = %entry.status, "skipped in bulk update");
                continue;
            }

            match target {
                QueueStatus::Cancelled => {
                    entry.status = QueueStatus::Cancelled;
                    entry.updated_at = now;
                }
                QueueStatus::Scheduled if entry.status == QueueStatus::Failed => {
                    entry.reset_for_retry(now);
                }
                QueueStatus::Scheduled => {
                    entry.status = QueueStatus::Scheduled;
                    entry.updated_at = now;
                }
                _ => unreachable!(),
            }
            self.store.update_entry(&entry)?;
            updated += 1;
        }

        info!(owner = %owner_id, requested = ids.len(), updated, target = %target, "bulk status update");
        Ok(updated)
    }

    /// Per-status counts with the stuck-queue heuristic applied.
    pub fn health(&self, owner_id: &str) -> Result<QueueHealth, QueueError> {
        let health = self.store.counts_by_status(owner_id)?.evaluate();
        if !health.healthy {
            warn!(
                owner = %owner_id,
                failed = health.failed,
                processing = health.processing,
                "queue unhealthy"
            );
        }
        Ok(health)
    }

    /// List entries with filters, ordered by scheduled time.
    pub fn list(&self, owner_id: &str, filter: &EntryFilter) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.store.list_entries(owner_id, filter)?)
    }

    /// Probe whether an instant would conflict for the given destinations.
    pub fn check_conflicts(
        &self,
        owner_id: &str,
        instant: DateTime<Utc>,
        destination_ids: &[String],
    ) -> Result<Vec<Uuid>, QueueError> {
        Ok(self.store.conflicting_entries(
            owner_id,
            instant,
            destination_ids,
            Self::conflict_window(),
        )?)
    }
}
