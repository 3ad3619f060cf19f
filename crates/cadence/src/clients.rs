//! Built-in collaborator implementations.
//!
//! `FsContentSource` serves a local media directory as the content library.
//! `LogDestination` is a dry-run platform client that records what would be
//! posted; real platform clients implement `Destination` and register the
//! same way.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use cadence_queue::{
    ContentItem, ContentSource, Destination, DestinationKind, PostContent, PostOutcome,
    SourceError,
};
use cadence_store::ContentFilters;

/// Content source backed by a flat directory of media files.
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn item_from(&self, path: &Path) -> Option<ContentItem> {
        let metadata = std::fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let filename = path.file_name()?.to_str()?.to_string();
        if filename.starts_with('.') {
            return None;
        }
        let created_at: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        Some(ContentItem {
            id: filename.clone(),
            mime_type: mime_for(&filename).to_string(),
            size_bytes: metadata.len(),
            url: path.to_string_lossy().into_owned(),
            description: None,
            caption: None,
            created_at,
            filename,
        })
    }
}

#[async_trait]
impl ContentSource for FsContentSource {
    async fn list(
        &self,
        _owner_id: &str,
        _filters: &ContentFilters,
    ) -> Result<Vec<ContentItem>, SourceError> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| SourceError(format!("cannot read {}: {e}", self.root.display())))?;

        let mut items = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SourceError(e.to_string()))?;
            if let Some(item) = self.item_from(&entry.path()) {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn is_available(&self, item_id: &str) -> Result<bool, SourceError> {
        // Item ids are filenames; reject anything that escapes the root
        if item_id.contains('/') || item_id.contains("..") {
            return Ok(false);
        }
        Ok(self.root.join(item_id).is_file())
    }
}

fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Dry-run destination client: logs the post and reports success.
pub struct LogDestination {
    kind: DestinationKind,
}

impl LogDestination {
    pub fn new(kind: DestinationKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Destination for LogDestination {
    fn kind(&self) -> DestinationKind {
        self.kind
    }

    async fn post(&self, destination_id: &str, content: &PostContent) -> PostOutcome {
        info!(
            destination = %destination_id,
            kind = %self.kind.as_str(),
            caption = %content.caption,
            media = content.media_urls.len(),
            hashtags = content.hashtags.len(),
            "dry-run post"
        );
        PostOutcome::posted(
            format!("dry-run-{}", uuid::Uuid::new_v4()),
            format!("https://{}.invalid/post", self.kind.as_str()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_source_lists_and_checks_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sunset.jpg"), b"jpeg bytes").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();

        let source = FsContentSource::new(dir.path());
        let items = source.list("alice", &ContentFilters::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "sunset.jpg");
        assert_eq!(items[0].mime_type, "image/jpeg");
        assert_eq!(items[0].size_bytes, 10);

        assert!(source.is_available("sunset.jpg").await.unwrap());
        assert!(!source.is_available("missing.jpg").await.unwrap());
        assert!(!source.is_available("../etc/passwd").await.unwrap());
    }

    #[test]
    fn test_mime_for_common_extensions() {
        assert_eq!(mime_for("a.PNG"), "image/png");
        assert_eq!(mime_for("clip.mp4"), "video/mp4");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
