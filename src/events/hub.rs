//! Broadcasts change events to feed subscribers.

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{ChangeEvent, ChangeFeed, DropReason, FeedConfig, FeedId, FeedMessage};

/// Internal feed state.
struct Feed {
    sender: Sender<FeedMessage>,
}

impl Feed {
    /// Try to send a message. Returns false if the buffer is full or the
    /// receiver is gone (the feed will be dropped).
    fn try_send(&self, message: FeedMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Hands out change feeds and publishes events to all of them in order.
pub struct ChangeFeedHub {
    /// Open feeds by ID.
    feeds: RwLock<HashMap<FeedId, Feed>>,
    /// Serializes publishers so every feed sees the same order.
    publish_lock: Mutex<()>,
    /// Counter for generating feed IDs.
    next_id: AtomicU64,
}

impl ChangeFeedHub {
    pub fn new() -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
            publish_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a new feed. It receives every event published from now on.
    pub fn subscribe(&self, config: FeedConfig) -> ChangeFeed {
        let id = FeedId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.feeds.write().insert(id, Feed { sender });
        tracing::debug!(feed = id.0, buffer = config.buffer_size, "feed opened");

        ChangeFeed { id, receiver }
    }

    /// Close a feed.
    pub fn unsubscribe(&self, id: FeedId) {
        let mut feeds = self.feeds.write();
        if let Some(feed) = feeds.remove(&id) {
            // Best effort
            let _ = feed.sender.try_send(FeedMessage::Dropped {
                reason: DropReason::Unsubscribed,
            });
            tracing::debug!(feed = id.0, "feed unsubscribed");
        }
    }

    /// Close every feed, telling receivers the source went away.
    pub fn close_all(&self) {
        let mut feeds = self.feeds.write();
        for (_, feed) in feeds.drain() {
            let _ = feed.sender.try_send(FeedMessage::Dropped {
                reason: DropReason::Disconnected,
            });
        }
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.read().len()
    }

    /// Publish an event to every open feed. Feeds that cannot take it are
    /// dropped.
    pub fn publish(&self, event: ChangeEvent) {
        let _order = self.publish_lock.lock();
        let mut to_remove = Vec::new();

        {
            let feeds = self.feeds.read();
            for (id, feed) in feeds.iter() {
                if !feed.try_send(FeedMessage::Change {
                    event: event.clone(),
                }) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut feeds = self.feeds.write();
            for id in to_remove {
                if let Some(feed) = feeds.remove(&id) {
                    tracing::warn!(feed = id.0, "dropping slow feed");
                    // Buffer is likely full, so this usually fails; the
                    // receiver still sees a disconnect once drained.
                    let _ = feed.sender.try_send(FeedMessage::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for ChangeFeedHub {
    fn default() -> Self {
        Self::new()
    }
}
