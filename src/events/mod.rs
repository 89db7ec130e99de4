//! Change events and the feeds that carry them.
//!
//! A feed is an ordered stream of [`ChangeEvent`]s describing mutations
//! applied to a document store, possibly by other processes. Feeds are
//! bounded; a source drops a feed whose consumer falls too far behind.
//!
//! # Example
//!
//! ```ignore
//! let hub = ChangeFeedHub::new();
//! let feed = hub.subscribe(FeedConfig::default());
//!
//! hub.publish(ChangeEvent::delete(42));
//!
//! match feed.recv() {
//!     Ok(FeedMessage::Change { event }) => println!("Got change: {:?}", event),
//!     Ok(FeedMessage::Dropped { reason }) => println!("Dropped: {:?}", reason),
//!     Err(_) => println!("Source gone"),
//! }
//! ```

mod hub;
mod types;

pub use hub::ChangeFeedHub;
pub use types::{ChangeEvent, ChangeFeed, ChangeKind, DropReason, FeedConfig, FeedId, FeedMessage};
