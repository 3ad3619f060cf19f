//! Destination collaborator contract and client registry.
//!
//! Each external platform is one [`Destination`] implementation. The
//! [`DestinationRegistry`] maps destination account ids to platform kinds and
//! kinds to client instances, so adding a platform means registering a new
//! implementation rather than editing a dispatch switch.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Supported destination platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Bluesky,
    Mastodon,
    Instagram,
    Twitter,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bluesky => "bluesky",
            Self::Mastodon => "mastodon",
            Self::Instagram => "instagram",
            Self::Twitter => "twitter",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bluesky" => Ok(Self::Bluesky),
            "mastodon" => Ok(Self::Mastodon),
            "instagram" => Ok(Self::Instagram),
            "twitter" => Ok(Self::Twitter),
            other => Err(format!("unknown destination kind: {other}")),
        }
    }
}

/// The resolved content handed to a destination client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContent {
    pub caption: String,
    pub media_urls: Vec<String>,
    pub hashtags: Vec<String>,
}

/// Result of one post to one destination.
///
/// Destinations report failure in-band rather than through errors; the
/// processor turns each outcome into a posting record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOutcome {
    pub success: bool,
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl PostOutcome {
    pub fn posted(external_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            url: None,
            error: Some(error.into()),
        }
    }
}

/// One external platform client. Implementations apply their own network
/// timeouts; the core treats any failure as a destination-level outcome.
#[async_trait]
pub trait Destination: Send + Sync {
    fn kind(&self) -> DestinationKind;

    async fn post(&self, destination_id: &str, content: &PostContent) -> PostOutcome;
}

/// Registry of destination accounts and platform clients.
#[derive(Default)]
pub struct DestinationRegistry {
    accounts: HashMap<String, DestinationKind>,
    clients: HashMap<DestinationKind, Arc<dyn Destination>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a platform client, keyed by its kind.
    pub fn register_client(&mut self, client: Arc<dyn Destination>) {
        self.clients.insert(client.kind(), client);
    }

    /// Map a destination account id to its platform kind.
    pub fn register_account(&mut self, destination_id: impl Into<String>, kind: DestinationKind) {
        self.accounts.insert(destination_id.into(), kind);
    }

    pub fn kind_of(&self, destination_id: &str) -> Option<DestinationKind> {
        self.accounts.get(destination_id).copied()
    }

    /// All registered destination account ids.
    pub fn account_ids(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Resolve the client for a destination account id.
    pub fn client_for(&self, destination_id: &str) -> Option<Arc<dyn Destination>> {
        let kind = self.kind_of(destination_id)?;
        self.clients.get(&kind).cloned()
    }
}
