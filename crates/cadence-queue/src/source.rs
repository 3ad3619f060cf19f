//! Content source collaborator contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cadence_store::ContentFilters;

/// Failure inside a content source collaborator. Translated into
/// [`crate::QueueError::Source`] at the crate boundary.
#[derive(Debug, Error)]
#[error("content source error: {0}")]
pub struct SourceError(pub String);

/// A candidate content item offered by a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source-provided caption, if any. When absent the selector derives one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// Whether this item passes the given mime/size constraints.
    pub fn passes(&self, filters: &ContentFilters) -> bool {
        if !filters.mime_prefixes.is_empty()
            && !filters
                .mime_prefixes
                .iter()
                .any(|p| self.mime_type.starts_with(p.as_str()))
        {
            return false;
        }
        filters.max_bytes.is_none_or(|max| self.size_bytes <= max)
    }
}

/// Read access to candidate content. Implementations own their timeouts;
/// any failure here is a per-entry posting failure, not a crash.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List eligible items for an owner, already roughly filtered.
    async fn list(
        &self,
        owner_id: &str,
        filters: &ContentFilters,
    ) -> Result<Vec<ContentItem>, SourceError>;

    /// Whether the item still exists and can be posted.
    async fn is_available(&self, item_id: &str) -> Result<bool, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(mime: &str, size: u64) -> ContentItem {
        ContentItem {
            id: "item-1".to_string(),
            filename: "sunset.jpg".to_string(),
            mime_type: mime.to_string(),
            size_bytes: size,
            url: "https://cdn.example/sunset.jpg".to_string(),
            description: None,
            caption: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filters_mime_and_size() {
        let filters = ContentFilters {
            mime_prefixes: vec!["image/".to_string()],
            max_bytes: Some(1000),
        };
        assert!(item("image/jpeg", 500).passes(&filters));
        assert!(!item("video/mp4", 500).passes(&filters));
        assert!(!item("image/jpeg", 2000).passes(&filters));
    }

    #[test]
    fn test_empty_filters_accept_anything() {
        assert!(item("application/pdf", u64::MAX).passes(&ContentFilters::default()));
    }
}
