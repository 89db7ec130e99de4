//! # Active Collection
//!
//! An in-memory mirror of a (filtered) document store collection, kept
//! current by consuming the store's ordered change feed instead of polling.
//!
//! ## Core Concepts
//!
//! - **Active collection**: lazily loaded id → document cache; writes pass
//!   through to the store, reads never leave memory
//! - **Change events**: ordered upserts and deletes from the store's feed,
//!   merged field by field into the cache
//! - **Subscribers**: a thread per feed forwarding events into one collection
//! - **Generations**: `flush` and `clear` discard the cache; the next access
//!   reloads from the store
//!
//! ## Example
//!
//! ```ignore
//! use active_collection::{ActiveCollection, Document, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new("tasks"));
//! let collection = Arc::new(ActiveCollection::new(store.clone()));
//! let _subscriber = collection.subscribe(store.subscribe())?;
//!
//! collection.add(Document::from_value(json!({"_id": 1, "title": "write docs"}))?)?;
//!
//! // Writes made by anyone else show up through the feed
//! store.save(&Document::from_value(json!({"_id": 2, "title": "review"}))?)?;
//! ```

pub mod collection;
pub mod error;
pub mod events;
pub mod observer;
pub mod store;
pub mod subscriber;
pub mod types;

// Re-exports
pub use collection::{apply_event, ActiveCollection, CollectionConfig, MergeOutcome, SkipReason};
pub use error::{CollectionError, Result};
pub use events::{
    ChangeEvent, ChangeFeed, ChangeFeedHub, ChangeKind, DropReason, FeedConfig, FeedId,
    FeedMessage,
};
pub use observer::{CollectionObserver, NoopObserver, TracingObserver};
pub use store::{DocumentStore, MemoryStore, SaveResult};
pub use subscriber::{EventSubscriber, SubscriberConfig};
pub use types::*;
