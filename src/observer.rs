//! Observability hook for active collections.

use crate::collection::MergeOutcome;
use crate::events::ChangeEvent;

/// Receives notifications about what an active collection is doing.
///
/// Every method has an empty default, so implementations override only what
/// they need. `load_triggered`, `load_completed`, `load_failed` and `flushed`
/// run while the collection's lock is held, as does the store query behind a
/// load, so event delivery waits on them. Keep them cheap and never call back
/// into the collection.
pub trait CollectionObserver: Send + Sync {
    /// The first access of a generation is about to query the store.
    fn load_triggered(&self, _collection: &str) {}

    /// A load finished and its snapshot was published.
    fn load_completed(&self, _collection: &str, _generation: u64, _documents: usize) {}

    /// The store query behind a load failed.
    fn load_failed(&self, _collection: &str, _error: &crate::CollectionError) {}

    /// A change event reached the collection.
    fn event_received(&self, _collection: &str, _event: &ChangeEvent) {}

    /// A change event was merged or skipped.
    fn event_merged(&self, _collection: &str, _event: &ChangeEvent, _outcome: &MergeOutcome) {}

    /// Cached state was discarded by `flush` or `clear`.
    fn flushed(&self, _collection: &str) {}
}

/// Forwards every notification to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CollectionObserver for TracingObserver {
    fn load_triggered(&self, collection: &str) {
        tracing::debug!(collection, "loading from store");
    }

    fn load_completed(&self, collection: &str, generation: u64, documents: usize) {
        tracing::debug!(collection, generation, documents, "load published");
    }

    fn load_failed(&self, collection: &str, error: &crate::CollectionError) {
        tracing::warn!(collection, %error, "load failed");
    }

    fn event_received(&self, collection: &str, event: &ChangeEvent) {
        tracing::trace!(collection, kind = ?event.kind, id = ?event.document_id, "change event received");
    }

    fn event_merged(&self, collection: &str, event: &ChangeEvent, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Skipped(reason) => {
                tracing::trace!(collection, id = ?event.document_id, ?reason, "change event skipped");
            }
            applied => {
                tracing::trace!(collection, id = ?event.document_id, outcome = ?applied, "change event applied");
            }
        }
    }

    fn flushed(&self, collection: &str) {
        tracing::debug!(collection, "cache flushed");
    }
}

/// Ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CollectionObserver for NoopObserver {}
