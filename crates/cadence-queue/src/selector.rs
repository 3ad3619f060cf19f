//! Content selection for schedule-driven posting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use cadence_store::{ContentRef, QueueStore, SelectionStrategy, SourceConfig, SourceKind};

use crate::error::QueueError;
use crate::source::{ContentItem, ContentSource};

/// A chosen content item together with the queue-ready content reference.
#[derive(Debug, Clone)]
pub struct ContentSelection {
    pub item: ContentItem,
    pub content: ContentRef,
}

/// Picks the next content item for a schedule slot.
///
/// Applies the source's mime/size filters and selection strategy, and skips
/// items the owner already posted inside the de-duplication look-back window.
pub struct ContentSelector {
    store: Arc<QueueStore>,
    sources: HashMap<SourceKind, Arc<dyn ContentSource>>,
}

impl ContentSelector {
    pub fn new(store: Arc<QueueStore>) -> Self {
        Self {
            store,
            sources: HashMap::new(),
        }
    }

    /// Register the source implementation for a source kind.
    pub fn register_source(&mut self, kind: SourceKind, source: Arc<dyn ContentSource>) {
        self.sources.insert(kind, source);
    }

    /// Select content for one slot, or `None` when nothing is eligible.
    ///
    /// `None` is not an error: schedule materialization skips the slot.
    /// If the first pick was posted recently, one more pick is attempted
    /// against the remaining candidates before giving up.
    pub async fn select(
        &self,
        owner_id: &str,
        config: &SourceConfig,
    ) -> Result<Option<ContentSelection>, QueueError> {
        let Some(source) = self.sources.get(&config.kind) else {
            warn!(kind = ?config.kind, "no content source registered for kind");
            return Ok(None);
        };

        let items = source
            .list(owner_id, &config.filters)
            .await
            .map_err(|e| QueueError::Source(e.to_string()))?;
        let mut candidates: Vec<ContentItem> = items
            .into_iter()
            .filter(|item| item.passes(&config.filters))
            .collect();
        if candidates.is_empty() {
            debug!(owner = %owner_id, "no eligible content items");
            return Ok(None);
        }

        let since = Utc::now() - Duration::days(i64::from(config.lookback_days));
        let recently_posted = self.store.recently_posted_item_ids(owner_id, since)?;

        // One retry against the remaining candidates if the pick is a repeat.
        for _ in 0..2 {
            if candidates.is_empty() {
                break;
            }
            let index = Self::pick_index(&candidates, config.strategy);
            let item = candidates.swap_remove(index);
            if recently_posted.contains(&item.id) {
                debug!(item_id = %item.id, "skipping recently posted item");
                continue;
            }
            let content = Self::build_content(config.kind, &item);
            return Ok(Some(ContentSelection { item, content }));
        }

        debug!(owner = %owner_id, "all candidates posted recently");
        Ok(None)
    }

    fn pick_index(candidates: &[ContentItem], strategy: SelectionStrategy) -> usize {
        match strategy {
            SelectionStrategy::Random => rand::thread_rng().gen_range(0..candidates.len()),
            SelectionStrategy::Oldest => candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, item)| item.created_at)
                .map(|(i, _)| i)
                .unwrap_or(0),
            SelectionStrategy::Newest => candidates
                .iter()
                .enumerate()
                .max_by_key(|(_, item)| item.created_at)
                .map(|(i, _)| i)
                .unwrap_or(0),
        }
    }

    fn build_content(kind: SourceKind, item: &ContentItem) -> ContentRef {
        let caption = item
            .caption
            .clone()
            .unwrap_or_else(|| suggest_caption(&item.filename, item.description.as_deref()));
        let hashtags = suggest_hashtags(&item.filename, item.description.as_deref());
        ContentRef::Library {
            source: kind,
            item_id: item.id.clone(),
            caption: Some(caption),
            hashtags,
        }
    }
}

/// Derive a caption from the filename and free-text description.
///
/// The filename is stripped of its extension, separators become spaces, and
/// words are title-cased. A description, when present, wins outright.
pub fn suggest_caption(filename: &str, description: Option<&str>) -> String {
    if let Some(desc) = description {
        let trimmed = desc.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive hashtags: explicit `#tags` in the description win, otherwise up to
/// three longer filename tokens are turned into tags.
pub fn suggest_hashtags(filename: &str, description: Option<&str>) -> Vec<String> {
    if let Some(desc) = description {
        let explicit: Vec<String> = desc
            .split_whitespace()
            .filter(|w| w.starts_with('#') && w.len() > 1)
            .map(|w| w.trim_end_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| w.len() > 1)
            .collect();
        if !explicit.is_empty() {
            return explicit;
        }
    }

    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    stem.split(['-', '_', ' '])
        .filter(|w| w.len() > 3 && w.chars().all(|c| c.is_alphanumeric()))
        .take(3)
        .map(|w| format!("#{}", w.to_lowercase()))
        .collect()
}
