//! Forwards a change feed into an active collection.

use crate::collection::ActiveCollection;
use crate::error::{CollectionError, Result};
use crate::events::{ChangeEvent, ChangeFeed, FeedId, FeedMessage};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Subscriber configuration.
#[derive(Clone, Debug, Default)]
pub struct SubscriberConfig {
    /// Name of the forwarding thread.
    /// Default: `active-collection-feed-<feed id>`
    pub thread_name: Option<String>,
}

/// State shared with the forwarding thread.
struct Shared {
    open: AtomicBool,
    forwarded: AtomicU64,
    failed: AtomicU64,
}

/// A listener bound to one change feed and one active collection.
///
/// Events are forwarded one at a time, in the order the feed delivers them,
/// on a dedicated thread. The subscriber closes when the feed disconnects,
/// when the source reports the feed dropped, or on [`close`](Self::close).
/// Dropping the subscriber closes it.
pub struct EventSubscriber {
    feed_id: FeedId,
    shared: Arc<Shared>,
    shutdown: Sender<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventSubscriber {
    /// Start forwarding `feed` into `collection`.
    pub fn spawn(collection: Arc<ActiveCollection>, feed: ChangeFeed) -> Result<Self> {
        Self::spawn_with_config(collection, feed, SubscriberConfig::default())
    }

    pub fn spawn_with_config(
        collection: Arc<ActiveCollection>,
        feed: ChangeFeed,
        config: SubscriberConfig,
    ) -> Result<Self> {
        let feed_id = feed.id;
        let (shutdown, shutdown_rx) = bounded(1);
        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let name = config
            .thread_name
            .unwrap_or_else(|| format!("active-collection-feed-{}", feed_id.0));
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(collection, feed, shutdown_rx, worker_shared))
            .map_err(|e| CollectionError::Subscriber(e.to_string()))?;

        Ok(Self {
            feed_id,
            shared,
            shutdown,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub fn feed_id(&self) -> FeedId {
        self.feed_id
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Number of events handed to the collection.
    pub fn forwarded(&self) -> u64 {
        self.shared.forwarded.load(Ordering::Acquire)
    }

    /// Number of events whose processing panicked.
    pub fn failed(&self) -> u64 {
        self.shared.failed.load(Ordering::Acquire)
    }

    /// Stop forwarding and wait for the thread to exit. Events still queued
    /// on the feed are not delivered.
    pub fn close(&self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.thread.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(
    collection: Arc<ActiveCollection>,
    feed: ChangeFeed,
    shutdown: Receiver<()>,
    shared: Arc<Shared>,
) {
    tracing::debug!(feed = feed.id.0, %collection, "subscriber started");

    loop {
        select! {
            recv(feed.receiver) -> message => match message {
                Ok(FeedMessage::Change { event }) => forward(&collection, &event, &shared),
                Ok(FeedMessage::Dropped { reason }) => {
                    tracing::warn!(feed = feed.id.0, ?reason, "feed dropped by source");
                    break;
                }
                Err(_) => {
                    tracing::debug!(feed = feed.id.0, "feed disconnected");
                    break;
                }
            },
            recv(shutdown) -> _ => break,
        }
    }

    shared.open.store(false, Ordering::Release);
    tracing::debug!(feed = feed.id.0, forwarded = shared.forwarded.load(Ordering::Relaxed), "subscriber closed");
}

/// Hand one event to the collection. A panic while applying it is logged
/// and does not end the subscription.
fn forward(collection: &ActiveCollection, event: &ChangeEvent, shared: &Shared) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| collection.on_event(event)));
    shared.forwarded.fetch_add(1, Ordering::AcqRel);

    if result.is_err() {
        shared.failed.fetch_add(1, Ordering::AcqRel);
        tracing::error!(id = ?event.document_id, kind = ?event.kind, "event processing panicked");
    }
}
