//! Background processing loop.
//!
//! One pass dispatches due entries, materializes active schedules into new
//! entries, and cleans up old terminal entries. Passes are single-flight:
//! a pass that starts while another is in progress is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cadence_queue::{
    ContentSelector, ContentSource, DestinationRegistry, PostContent, PostOutcome, QueueError,
    QueueManager,
};
use cadence_scheduler::Scheduler;
use cadence_store::{
    ContentFilters, ContentRef, PostingRecord, QueueEntry, QueueEntryRequest, QueueStatus,
    QueueStore, Schedule, SourceKind,
};

use crate::error::ProcessorError;

/// Tuning knobs for the processing loop.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Time between processing passes.
    pub interval: StdDuration,
    /// Maximum due entries dispatched per pass.
    pub batch_size: u32,
    /// How far ahead schedules are materialized, in days.
    pub horizon_days: u32,
    /// Cancelled entries older than this are hard-deleted.
    pub cancelled_retention_days: i64,
    /// Posted entries older than this are hard-deleted.
    pub posted_retention_days: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(5 * 60),
            batch_size: 10,
            horizon_days: 3,
            cancelled_retention_days: 30,
            posted_retention_days: 90,
        }
    }
}

/// What one processing pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// The pass was skipped because another pass was already running.
    pub skipped: bool,
    /// Due entries dispatched this pass.
    pub processed: usize,
    /// Entries that reached `Posted`.
    pub posted: usize,
    /// Entries that reached terminal `Failed`.
    pub failed: usize,
    /// Entries created by schedule materialization.
    pub materialized: usize,
    /// Old terminal entries deleted.
    pub cleaned: usize,
}

impl PassSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// A point-in-time view of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStatus {
    pub running: bool,
    pub interval: StdDuration,
}

/// Drives the queue: dispatches due entries to destinations, keeps active
/// schedules topped up, and prunes old terminal entries.
pub struct QueueProcessor {
    store: Arc<QueueStore>,
    manager: Arc<QueueManager>,
    selector: Arc<ContentSelector>,
    scheduler: Arc<Scheduler>,
    registry: Arc<DestinationRegistry>,
    sources: HashMap<SourceKind, Arc<dyn ContentSource>>,
    config: ProcessorConfig,
    running: AtomicBool,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<QueueStore>,
        manager: Arc<QueueManager>,
        selector: Arc<ContentSelector>,
        scheduler: Arc<Scheduler>,
        registry: Arc<DestinationRegistry>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            manager,
            selector,
            scheduler,
            registry,
            sources: HashMap::new(),
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Register a content source for availability checks and media lookup
    /// at dispatch time.
    pub fn register_source(&mut self, kind: SourceKind, source: Arc<dyn ContentSource>) {
        self.sources.insert(kind, source);
    }

    pub fn status(&self) -> ProcessorStatus {
        ProcessorStatus {
            running: self.running.load(Ordering::SeqCst),
            interval: self.config.interval,
        }
    }

    /// Run the processing loop until shutdown is signalled.
    ///
    /// The first pass runs immediately; later passes run on a fixed
    /// interval. An in-flight pass always runs to completion.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.config.interval, "queue processor starting");

        loop {
            if *shutdown_rx.borrow() {
                info!("queue processor shutting down");
                break;
            }

            match self.process().await {
                Ok(summary) if summary.skipped => {}
                Ok(summary) => {
                    debug!(
                        processed = summary.processed,
                        posted = summary.posted,
                        failed = summary.failed,
                        materialized = summary.materialized,
                        cleaned = summary.cleaned,
                        "processing pass complete"
                    );
                }
                Err(error) => {
                    error!(%error, "processing pass failed");
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("queue processor received shutdown signal");
                    }
                }
                _ = sleep(self.config.interval) => {}
            }
        }

        info!("queue processor shut down gracefully");
    }

    /// Run one processing pass.
    ///
    /// Single-flight: if a pass is already in progress this returns a
    /// skipped summary without touching the queue.
    pub async fn process(&self) -> Result<PassSummary, ProcessorError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("processing pass already in progress, skipping");
            return Ok(PassSummary::skipped());
        }

        let result = self.run_pass().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Dispatch one entry by id, outside the normal polling cadence.
    ///
    /// The entry still has to win the Scheduled -> Processing transition,
    /// so a concurrently running pass cannot double-dispatch it.
    pub async fn process_single(&self, id: Uuid) -> Result<Option<QueueStatus>, ProcessorError> {
        let entry = self
            .store
            .get_entry_by_id(id)?
            .ok_or(ProcessorError::NotFound(id))?;
        self.dispatch_entry(entry).await
    }

    async fn run_pass(&self) -> Result<PassSummary, ProcessorError> {
        let now = Utc::now();
        let mut summary = PassSummary::default();

        let due = self.store.due_entries(now, self.config.batch_size)?;
        debug!(due = due.len(), "fetched due entries");
        for entry in due {
            let id = entry.id;
            match self.dispatch_entry(entry).await {
                Ok(Some(status)) => {
                    summary.processed += 1;
                    match status {
                        QueueStatus::Posted => summary.posted += 1,
                        QueueStatus::Failed => summary.failed += 1,
                        _ => {}
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(entry_id = %id, %error, "failed to dispatch entry");
                }
            }
        }

        summary.materialized = self.materialize(now).await;
        summary.cleaned = self.cleanup(now);

        Ok(summary)
    }

    /// Dispatch one entry to all of its destinations.
    ///
    /// Returns the entry's resulting status, or `None` when the entry was
    /// not in `Scheduled` state (someone else claimed it, or it was
    /// cancelled in the meantime).
    async fn dispatch_entry(
        &self,
        mut entry: QueueEntry,
    ) -> Result<Option<QueueStatus>, ProcessorError> {
        let now = Utc::now();
        if !self
            .store
            .set_status_if(entry.id, QueueStatus::Scheduled, QueueStatus::Processing, now)?
        {
            debug!(entry_id = %entry.id, "entry no longer scheduled, skipping");
            return Ok(None);
        }
        entry.status = QueueStatus::Processing;
        entry.updated_at = now;

        let Some(content) = self.resolve_content(&entry).await else {
            // Content that disappeared counts as a normal failed attempt,
            // so transient source outages get the usual retry backoff.
            entry.record_failure("content is no longer available".to_string(), now);
            self.store.update_entry(&entry)?;
            info!(
                entry_id = %entry.id,
                attempts = entry.attempts,
                status = %entry.status,
                "content unavailable, dispatch skipped"
            );
            return Ok(Some(entry.status));
        };

        let mut failures: Vec<String> = Vec::new();
        for destination_id in entry.destination_ids.clone() {
            let outcome = self.post_to(&destination_id, &content).await;
            let record = if outcome.success {
                let mut record = PostingRecord::success(entry.id, &destination_id, now);
                record.external_post_id = outcome.external_id;
                record.external_url = outcome.url;
                record
            } else {
                let message = outcome
                    .error
                    .unwrap_or_else(|| "destination reported failure".to_string());
                warn!(entry_id = %entry.id, destination = %destination_id, error = %message, "post failed");
                failures.push(format!("{destination_id}: {message}"));
                PostingRecord::failure(entry.id, &destination_id, message, now)
            };
            if let Err(error) = self.store.insert_record(&record) {
                warn!(entry_id = %entry.id, %error, "failed to persist posting record");
            }
        }

        if failures.len() == entry.destination_ids.len() {
            entry.record_failure(failures.join("; "), now);
        } else {
            if !failures.is_empty() {
                warn!(
                    entry_id = %entry.id,
                    failed = failures.len(),
                    total = entry.destination_ids.len(),
                    "entry posted with partial destination failures"
                );
            }
            entry.record_success(now);
        }
        self.store.update_entry(&entry)?;

        info!(
            entry_id = %entry.id,
            status = %entry.status,
            attempts = entry.attempts,
            "dispatched entry"
        );
        Ok(Some(entry.status))
    }

    async fn post_to(&self, destination_id: &str, content: &PostContent) -> PostOutcome {
        match self.registry.client_for(destination_id) {
            Some(client) => client.post(destination_id, content).await,
            None => PostOutcome::failed(format!(
                "no client registered for destination {destination_id}"
            )),
        }
    }

    /// Turn an entry's content reference into postable content, or `None`
    /// when the content cannot be resolved right now.
    async fn resolve_content(&self, entry: &QueueEntry) -> Option<PostContent> {
        match &entry.content {
            ContentRef::Inline {
                caption,
                media_urls,
                hashtags,
            } => Some(PostContent {
                caption: caption.clone(),
                media_urls: media_urls.clone(),
                hashtags: hashtags.clone(),
            }),
            ContentRef::Library {
                source,
                item_id,
                caption,
                hashtags,
            } => {
                let Some(client) = self.sources.get(source) else {
                    warn!(kind = ?source, "no content source registered for kind");
                    return None;
                };
                match client.is_available(item_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(item_id = %item_id, "library item no longer available");
                        return None;
                    }
                    Err(error) => {
                        warn!(item_id = %item_id, %error, "availability check failed");
                        return None;
                    }
                }

                let items = match client.list(&entry.owner_id, &ContentFilters::default()).await {
                    Ok(items) => items,
                    Err(error) => {
                        warn!(item_id = %item_id, %error, "content source listing failed");
                        return None;
                    }
                };
                let item = items.into_iter().find(|i| &i.id == item_id)?;
                Some(PostContent {
                    caption: caption
                        .clone()
                        .or(item.caption)
                        .or(item.description)
                        .unwrap_or_default(),
                    media_urls: vec![item.url],
                    hashtags: hashtags.clone(),
                })
            }
        }
    }

    /// Top up active schedules with new entries over the planning horizon.
    /// Collaborator failures are logged per schedule, never propagated.
    async fn materialize(&self, now: DateTime<Utc>) -> usize {
        let schedules = match self.store.list_active_schedules() {
            Ok(schedules) => schedules,
            Err(error) => {
                warn!(%error, "failed to list active schedules");
                return 0;
            }
        };

        let mut added = 0;
        for schedule in schedules {
            added += self.materialize_schedule(&schedule, now).await;
        }
        added
    }

    async fn materialize_schedule(&self, schedule: &Schedule, now: DateTime<Utc>) -> usize {
        let horizon = now + Duration::days(i64::from(self.config.horizon_days));
        let live = match self
            .store
            .count_entries_for_schedule(schedule.id, now, horizon)
        {
            Ok(count) => count,
            Err(error) => {
                warn!(schedule_id = %schedule.id, %error, "failed to count schedule entries");
                return 0;
            }
        };
        let capacity = u64::from(schedule.max_posts_per_day) * u64::from(self.config.horizon_days);
        if live >= capacity {
            return 0;
        }

        let planned = match self
            .scheduler
            .generate_queue_items(schedule, self.config.horizon_days)
        {
            Ok(planned) => planned,
            Err(error) => {
                warn!(schedule_id = %schedule.id, %error, "failed to expand schedule");
                return 0;
            }
        };

        let mut added = 0;
        let budget = (capacity - live) as usize;
        for plan in planned.into_iter().take(budget) {
            let selection = match self.selector.select(&schedule.owner_id, &schedule.source).await
            {
                Ok(Some(selection)) => selection,
                Ok(None) => {
                    debug!(schedule_id = %schedule.id, "no eligible content, slot skipped");
                    continue;
                }
                Err(error) => {
                    warn!(schedule_id = %schedule.id, %error, "content selection failed");
                    continue;
                }
            };

            let request = QueueEntryRequest {
                content: selection.content,
                scheduled_for: plan.scheduled_for,
                destination_ids: plan.destination_ids,
                priority: Default::default(),
                schedule_id: Some(plan.schedule_id),
                metadata: serde_json::Value::Null,
            };
            match self.manager.add(&schedule.owner_id, request) {
                Ok(entry) => {
                    debug!(
                        schedule_id = %schedule.id,
                        entry_id = %entry.id,
                        scheduled_for = %entry.scheduled_for,
                        "materialized schedule entry"
                    );
                    added += 1;
                }
                Err(QueueError::SchedulingConflict { existing, .. }) => {
                    info!(
                        schedule_id = %schedule.id,
                        conflicts_with = %existing,
                        scheduled_for = %plan.scheduled_for,
                        "slot conflicts with an existing entry, skipped"
                    );
                }
                Err(error) => {
                    warn!(schedule_id = %schedule.id, %error, "failed to enqueue materialized entry");
                }
            }
        }
        added
    }

    /// Hard-delete old terminal entries. Posting records are kept.
    fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;

        let cutoff = now - Duration::days(self.config.cancelled_retention_days);
        match self.store.delete_cancelled_before(cutoff) {
            Ok(n) => removed += n,
            Err(error) => warn!(%error, "failed to clean up cancelled entries"),
        }

        let cutoff = now - Duration::days(self.config.posted_retention_days);
        match self.store.delete_posted_before(cutoff) {
            Ok(n) => removed += n,
            Err(error) => warn!(%error, "failed to clean up posted entries"),
        }

        if removed > 0 {
            info!(removed, "cleaned up old terminal entries");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Weekday;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    use cadence_analytics::AnalyticsEngine;
    use cadence_queue::{ContentItem, Destination, DestinationKind, SourceError};
    use cadence_store::{
        Priority, Recurrence, SelectionStrategy, SourceConfig, TimeSlot, MAX_ATTEMPTS,
    };

    struct FakeDestination {
        kind: DestinationKind,
        fail_ids: HashSet<String>,
    }

    #[async_trait]
    impl Destination for FakeDestination {
        fn kind(&self) -> DestinationKind {
            self.kind
        }

        async fn post(&self, destination_id: &str, _content: &PostContent) -> PostOutcome {
            if self.fail_ids.contains(destination_id) {
                PostOutcome::failed("simulated outage")
            } else {
                PostOutcome::posted("ext-1", "https://example.test/ext-1")
            }
        }
    }

    struct BlockingDestination {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Destination for BlockingDestination {
        fn kind(&self) -> DestinationKind {
            DestinationKind::Bluesky
        }

        async fn post(&self, _destination_id: &str, _content: &PostContent) -> PostOutcome {
            self.started.notify_one();
            self.release.notified().await;
            PostOutcome::posted("ext-1", "https://example.test/ext-1")
        }
    }

    struct FakeSource {
        items: Mutex<Vec<ContentItem>>,
        available: Mutex<bool>,
    }

    impl FakeSource {
        fn with_items(items: Vec<ContentItem>) -> Self {
            Self {
                items: Mutex::new(items),
                available: Mutex::new(true),
            }
        }

        fn set_available(&self, available: bool) {
            *self.available.lock().unwrap() = available;
        }
    }

    #[async_trait]
    impl ContentSource for FakeSource {
        async fn list(
            &self,
            _owner_id: &str,
            _filters: &ContentFilters,
        ) -> Result<Vec<ContentItem>, SourceError> {
            Ok(self.items.lock().unwrap().clone())
        }

        async fn is_available(&self, _item_id: &str) -> Result<bool, SourceError> {
            Ok(*self.available.lock().unwrap())
        }
    }

    fn item(id: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            filename: format!("{id}.jpg"),
            mime_type: "image/jpeg".to_string(),
            size_bytes: 1024,
            url: format!("https://cdn.example.test/{id}.jpg"),
            description: None,
            caption: None,
            created_at: Utc::now(),
        }
    }

    struct Harness {
        processor: Arc<QueueProcessor>,
        store: Arc<QueueStore>,
        manager: Arc<QueueManager>,
    }

    fn harness(clients: Vec<Arc<dyn Destination>>, source: Option<Arc<FakeSource>>) -> Harness {
        let store = Arc::new(QueueStore::open_in_memory().unwrap());
        let manager = Arc::new(QueueManager::new(store.clone()));

        let mut registry = DestinationRegistry::new();
        registry.register_account("d1", DestinationKind::Bluesky);
        registry.register_account("d2", DestinationKind::Mastodon);
        for client in clients {
            registry.register_client(client);
        }
        let registry = Arc::new(registry);

        let mut selector = ContentSelector::new(store.clone());
        if let Some(source) = &source {
            selector.register_source(SourceKind::Library, source.clone());
        }
        let selector = Arc::new(selector);

        let analytics = Arc::new(AnalyticsEngine::new(store.clone(), registry.clone()));
        let scheduler = Arc::new(Scheduler::new(store.clone(), analytics));

        let mut processor = QueueProcessor::new(
            store.clone(),
            manager.clone(),
            selector,
            scheduler,
            registry,
            ProcessorConfig::default(),
        );
        if let Some(source) = source {
            processor.register_source(SourceKind::Library, source);
        }

        Harness {
            processor: Arc::new(processor),
            store,
            manager,
        }
    }

    fn due_entry(store: &QueueStore, destinations: &[&str]) -> QueueEntry {
        let now = Utc::now();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            owner_id: "alice".to_string(),
            status: QueueStatus::Scheduled,
            priority: Priority::Normal,
            content: ContentRef::Inline {
                caption: "hello".to_string(),
                media_urls: vec![],
                hashtags: vec![],
            },
            scheduled_for: now - Duration::minutes(1),
            posted_at: None,
            destination_ids: destinations.iter().map(|s| s.to_string()).collect(),
            attempts: 0,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
            schedule_id: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };
        store
            .insert_entry_checked(&entry, Duration::minutes(30))
            .unwrap();
        entry
    }

    #[tokio::test]
    async fn test_all_destinations_succeed_marks_posted() {
        let harness = harness(
            vec![Arc::new(FakeDestination {
                kind: DestinationKind::Bluesky,
                fail_ids: HashSet::new(),
            })],
            None,
        );
        let entry = due_entry(&harness.store, &["d1"]);

        let summary = harness.processor.process().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.posted, 1);

        let entry = harness.store.get_entry_by_id(entry.id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Posted);
        assert!(entry.posted_at.is_some());

        let records = harness.store.records_for_entry(entry.id).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].external_post_id.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn test_mixed_outcome_marks_posted_with_failure_record() {
        let harness = harness(
            vec![
                Arc::new(FakeDestination {
                    kind: DestinationKind::Bluesky,
                    fail_ids: HashSet::new(),
                }),
                Arc::new(FakeDestination {
                    kind: DestinationKind::Mastodon,
                    fail_ids: HashSet::from(["d2".to_string()]),
                }),
            ],
            None,
        );
        let entry = due_entry(&harness.store, &["d1", "d2"]);

        let status = harness.processor.process_single(entry.id).await.unwrap();
        assert_eq!(status, Some(QueueStatus::Posted));

        let records = harness.store.records_for_entry(entry.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().filter(|r| r.success).count(), 1);
        let failed = records.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.destination_id, "d2");
        assert_eq!(failed.error.as_deref(), Some("simulated outage"));
    }

    #[tokio::test]
    async fn test_repeated_failure_exhausts_retries() {
        let harness = harness(
            vec![Arc::new(FakeDestination {
                kind: DestinationKind::Bluesky,
                fail_ids: HashSet::from(["d1".to_string()]),
            })],
            None,
        );
        let entry = due_entry(&harness.store, &["d1"]);

        // First two failures back off and stay retryable
        for expected_attempts in 1..MAX_ATTEMPTS {
            let status = harness.processor.process_single(entry.id).await.unwrap();
            assert_eq!(status, Some(QueueStatus::Scheduled));
            let current = harness.store.get_entry_by_id(entry.id).unwrap().unwrap();
            assert_eq!(current.attempts, expected_attempts);
            let delay = current.next_retry_at.unwrap() - current.last_attempt_at.unwrap();
            assert_eq!(delay, Duration::hours(1 << expected_attempts));
        }

        // Third failure is terminal
        let status = harness.processor.process_single(entry.id).await.unwrap();
        assert_eq!(status, Some(QueueStatus::Failed));
        let current = harness.store.get_entry_by_id(entry.id).unwrap().unwrap();
        assert_eq!(current.attempts, MAX_ATTEMPTS);
        assert_eq!(current.next_retry_at, None);
        assert!(current.last_error.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_content_counts_as_failed_attempt() {
        let source = Arc::new(FakeSource::with_items(vec![item("pic-1")]));
        let harness = harness(
            vec![Arc::new(FakeDestination {
                kind: DestinationKind::Bluesky,
                fail_ids: HashSet::new(),
            })],
            Some(source.clone()),
        );

        let now = Utc::now();
        let mut entry = due_entry(&harness.store, &["d1"]);
        entry.content = ContentRef::Library {
            source: SourceKind::Library,
            item_id: "pic-1".to_string(),
            caption: Some("a picture".to_string()),
            hashtags: vec![],
        };
        entry.updated_at = now;
        harness.store.update_entry(&entry).unwrap();

        source.set_available(false);
        let status = harness.processor.process_single(entry.id).await.unwrap();
        assert_eq!(status, Some(QueueStatus::Scheduled));

        let current = harness.store.get_entry_by_id(entry.id).unwrap().unwrap();
        assert_eq!(current.attempts, 1);
        assert!(current.next_retry_at.is_some());
        // No dispatch happened, so no posting records either
        assert!(harness.store.records_for_entry(entry.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_process_is_single_flight() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let harness = harness(
            vec![Arc::new(BlockingDestination {
                started: started.clone(),
                release: release.clone(),
            })],
            None,
        );
        due_entry(&harness.store, &["d1"]);

        let processor = harness.processor.clone();
        let first = tokio::spawn(async move { processor.process().await });

        // Wait until the first pass is mid-dispatch, then try a second pass
        started.notified().await;
        let second = harness.processor.process().await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.processed, 0);

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(!first.skipped);
        assert_eq!(first.processed, 1);
    }

    #[tokio::test]
    async fn test_materialization_skips_when_selector_has_nothing() {
        // Source registered but empty: selection yields None, no entries
        let source = Arc::new(FakeSource::with_items(vec![]));
        let harness = harness(
            vec![Arc::new(FakeDestination {
                kind: DestinationKind::Bluesky,
                fail_ids: HashSet::new(),
            })],
            Some(source),
        );

        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            owner_id: "alice".to_string(),
            active: true,
            recurrence: Recurrence::Daily,
            slots: vec![TimeSlot::new(12, 0, "UTC")],
            days_of_week: vec![Weekday::Mon],
            source: SourceConfig {
                kind: SourceKind::Library,
                strategy: SelectionStrategy::Random,
                filters: ContentFilters::default(),
                lookback_days: 30,
            },
            destination_ids: vec!["d1".to_string()],
            max_posts_per_day: 2,
            min_hours_between_posts: 1,
            created_at: now,
            updated_at: now,
        };
        harness.store.insert_schedule(&schedule).unwrap();

        let summary = harness.processor.process().await.unwrap();
        assert_eq!(summary.materialized, 0);
        assert!(harness
            .manager
            .list("alice", &Default::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_materialization_creates_entries_up_to_horizon() {
        let source = Arc::new(FakeSource::with_items(vec![item("pic-1"), item("pic-2")]));
        let harness = harness(
            vec![Arc::new(FakeDestination {
                kind: DestinationKind::Bluesky,
                fail_ids: HashSet::new(),
            })],
            Some(source),
        );

        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            owner_id: "alice".to_string(),
            active: true,
            recurrence: Recurrence::Daily,
            // Two slots per day, far enough apart to clear conflict checks
            slots: vec![TimeSlot::new(3, 0, "UTC"), TimeSlot::new(15, 0, "UTC")],
            days_of_week: vec![],
            source: SourceConfig {
                kind: SourceKind::Library,
                strategy: SelectionStrategy::Oldest,
                filters: ContentFilters::default(),
                lookback_days: 30,
            },
            destination_ids: vec!["d1".to_string()],
            max_posts_per_day: 2,
            min_hours_between_posts: 2,
            created_at: now,
            updated_at: now,
        };
        harness.store.insert_schedule(&schedule).unwrap();

        let summary = harness.processor.process().await.unwrap();
        assert!(summary.materialized > 0);

        let entries = harness.manager.list("alice", &Default::default()).unwrap();
        assert_eq!(entries.len(), summary.materialized);
        for entry in &entries {
            assert_eq!(entry.schedule_id, Some(schedule.id));
            assert_eq!(entry.status, QueueStatus::Scheduled);
            assert!(entry.scheduled_for > now);
        }

        // A second pass tops up nothing new while capacity is full
        let summary = harness.processor.process().await.unwrap();
        let entries_after = harness.manager.list("alice", &Default::default()).unwrap();
        assert_eq!(entries_after.len(), entries.len() + summary.materialized);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_terminal_entries() {
        let harness = harness(vec![], None);
        let now = Utc::now();

        let mut old_cancelled = due_entry(&harness.store, &["d1"]);
        old_cancelled.status = QueueStatus::Cancelled;
        old_cancelled.updated_at = now - Duration::days(31);
        harness.store.update_entry(&old_cancelled).unwrap();

        let mut old_posted = QueueEntry {
            scheduled_for: now - Duration::days(100),
            ..due_entry(&harness.store, &["d2"])
        };
        old_posted.status = QueueStatus::Posted;
        old_posted.posted_at = Some(now - Duration::days(100));
        old_posted.updated_at = now - Duration::days(100);
        harness.store.update_entry(&old_posted).unwrap();
        harness
            .store
            .insert_record(&PostingRecord::success(
                old_posted.id,
                "d2",
                now - Duration::days(100),
            ))
            .unwrap();

        let summary = harness.processor.process().await.unwrap();
        assert_eq!(summary.cleaned, 2);
        assert!(harness.store.get_entry_by_id(old_cancelled.id).unwrap().is_none());
        assert!(harness.store.get_entry_by_id(old_posted.id).unwrap().is_none());
        // Posting records outlive their entries
        assert_eq!(
            harness.store.records_for_entry(old_posted.id).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_status_reports_interval() {
        let harness = harness(vec![], None);
        let status = harness.processor.status();
        assert!(!status.running);
        assert_eq!(status.interval, StdDuration::from_secs(300));
    }
}
