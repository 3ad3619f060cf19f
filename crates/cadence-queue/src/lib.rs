//! Queue management for Cadence.
//!
//! This crate provides:
//! - [`QueueManager`]: owner-scoped CRUD over queue entries, enforcing the
//!   scheduling-conflict invariant and retry reset logic
//! - [`ContentSelector`]: strategy-based content selection with a
//!   recently-posted de-duplication window
//! - The collaborator seams the processing loop dispatches through:
//!   [`ContentSource`] and [`Destination`]/[`DestinationRegistry`]

mod destination;
mod error;
mod manager;
mod selector;
mod source;

pub use destination::{
    Destination, DestinationKind, DestinationRegistry, PostContent, PostOutcome,
};
pub use error::QueueError;
pub use manager::QueueManager;
pub use selector::{ContentSelection, ContentSelector, suggest_caption, suggest_hashtags};
pub use source::{ContentItem, ContentSource, SourceError};
