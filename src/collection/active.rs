//! The active collection: a store-backed cache kept current by change events.

use crate::error::{CollectionError, Result};
use crate::events::{ChangeEvent, ChangeFeed};
use crate::observer::{CollectionObserver, TracingObserver};
use crate::store::DocumentStore;
use crate::subscriber::EventSubscriber;
use crate::types::{identity_of, CollectionStats, Document, DocumentId, Filter};
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::merge::{apply_event, MergeOutcome, SkipReason};

/// Active collection configuration.
#[derive(Clone)]
pub struct CollectionConfig {
    /// Restrict the mirror to matching documents (None = whole store).
    pub filter: Option<Filter>,

    /// Receives load and merge notifications.
    /// Default: [`TracingObserver`]
    pub observer: Arc<dyn CollectionObserver>,
}

impl CollectionConfig {
    /// Default config mirroring only documents that match `filter`.
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Default::default()
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            filter: None,
            observer: Arc::new(TracingObserver),
        }
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Mutable state guarded by the collection lock.
struct CollectionState {
    /// Whether `documents` holds a published load snapshot.
    loaded: bool,

    /// Incremented by every completed load.
    generation: u64,

    /// Cached documents by id, in load order followed by insertion order.
    documents: IndexMap<DocumentId, Document>,
}

/// An in-memory mirror of a (filtered) store collection.
///
/// The mirror loads lazily on first access, exactly once per generation.
/// Writes go to the store first and are then applied locally; changes made
/// by anyone else arrive through [`on_event`](Self::on_event), usually from
/// an [`EventSubscriber`]. `flush` and `clear` end the generation and the
/// next access reloads.
///
/// A single lock guards the load, every client mutation and every event
/// merge. Store calls made by `add`, `remove`, `clear` and the load run while
/// that lock is held, so a slow store also delays event delivery.
///
/// Two collections are equal when they share the same store (by `Arc`
/// identity) and the same filter. Cached contents never affect equality or
/// hashing.
pub struct ActiveCollection {
    store: Arc<dyn DocumentStore>,
    filter: Option<Filter>,
    observer: Arc<dyn CollectionObserver>,

    state: Mutex<CollectionState>,

    /// Lock-free view of `state.loaded`.
    loaded: AtomicBool,

    loads: AtomicU64,
    events_applied: AtomicU64,
    events_skipped: AtomicU64,
}

impl ActiveCollection {
    /// Mirror the whole store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, CollectionConfig::default())
    }

    /// Mirror the documents matching `filter`.
    pub fn with_filter(store: Arc<dyn DocumentStore>, filter: Filter) -> Self {
        Self::with_config(store, CollectionConfig::filtered(filter))
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: CollectionConfig) -> Self {
        Self {
            store,
            filter: config.filter,
            observer: config.observer,
            state: Mutex::new(CollectionState {
                loaded: false,
                generation: 0,
                documents: IndexMap::new(),
            }),
            loaded: AtomicBool::new(false),
            loads: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            events_skipped: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    fn name(&self) -> &str {
        self.store.name()
    }

    /// Whether the current generation has been loaded. Does not block.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Number of loads completed so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            loads: self.loads.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
        }
    }

    // --- Loading ---

    /// Lock the state, loading it first if this generation is not loaded.
    ///
    /// Only the caller that finds the state unloaded queries the store;
    /// everyone else blocks on the lock until the snapshot is published.
    fn lock_loaded(&self) -> Result<MutexGuard<'_, CollectionState>> {
        let mut state = self.state.lock();
        if !state.loaded {
            self.load_into(&mut state)?;
        }
        Ok(state)
    }

    fn load_into(&self, state: &mut CollectionState) -> Result<()> {
        self.observer.load_triggered(self.name());

        // On failure the state stays unloaded and the next access retries
        let found = match self.store.find(self.filter.as_ref()) {
            Ok(found) => found,
            Err(e) => {
                self.observer.load_failed(self.name(), &e);
                return Err(e);
            }
        };

        let mut documents = IndexMap::with_capacity(found.len());
        for doc in found {
            match identity_of(&doc) {
                Some(id) => {
                    documents.insert(id, doc);
                }
                None => {
                    tracing::warn!(collection = self.name(), "skipping stored document without id");
                }
            }
        }

        state.documents = documents;
        state.loaded = true;
        state.generation += 1;
        self.loaded.store(true, Ordering::Release);
        self.loads.fetch_add(1, Ordering::Relaxed);

        self.observer
            .load_completed(self.name(), state.generation, state.documents.len());
        Ok(())
    }

    /// Load now if not loaded yet.
    pub fn ensure_loaded(&self) -> Result<()> {
        self.lock_loaded().map(|_| ())
    }

    fn reset(&self, state: &mut CollectionState) {
        state.documents = IndexMap::new();
        state.loaded = false;
        self.loaded.store(false, Ordering::Release);
        self.observer.flushed(self.name());
    }

    // --- Writes ---

    /// Save `doc` to the store and cache it under its effective id.
    ///
    /// Returns `true` if no document with that id was cached before (a pure
    /// insert) and `false` if one was replaced. The cached entry is replaced
    /// wholesale, unlike event upserts which merge. The store write happens
    /// even when the content is unchanged.
    pub fn add(&self, doc: Document) -> Result<bool> {
        doc.checked_id()?;
        let mut state = self.lock_loaded()?;

        let saved = self.store.save(&doc)?;
        let id = saved
            .assigned_id
            .or_else(|| identity_of(&doc))
            .ok_or(CollectionError::MissingId)?;

        let doc = doc.with_id(&id);
        let replaced = state.documents.insert(id, doc).is_some();
        Ok(!replaced)
    }

    /// Add every document in order. Returns `true` if any add was a pure
    /// insert. Stops at the first store error.
    pub fn add_all<I>(&self, docs: I) -> Result<bool>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut inserted = false;
        for doc in docs {
            inserted |= self.add(doc)?;
        }
        Ok(inserted)
    }

    /// Remove the cached document with the same id from the store and the
    /// cache.
    ///
    /// Returns `false` without touching the store when the id is not cached.
    pub fn remove(&self, doc: &Document) -> Result<bool> {
        let Some(id) = identity_of(doc) else {
            return Ok(false);
        };

        let mut state = self.lock_loaded()?;
        if !state.documents.contains_key(&id) {
            return Ok(false);
        }

        self.store.remove(doc)?;
        state.documents.shift_remove(&id);
        Ok(true)
    }

    /// Remove every document. Returns `true` if any removal happened.
    pub fn remove_all<'a, I>(&self, docs: I) -> Result<bool>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut removed = false;
        for doc in docs {
            removed |= self.remove(doc)?;
        }
        Ok(removed)
    }

    /// Drop the whole backing store collection and unload.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.store.drop_all()?;
        self.reset(&mut state);
        Ok(())
    }

    /// Discard cached state without touching the store. The next access
    /// reloads.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        self.reset(&mut state);
    }

    // --- Reads ---

    pub fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        let state = self.lock_loaded()?;
        Ok(state.documents.get(id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock_loaded()?.documents.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock_loaded()?.documents.is_empty())
    }

    /// Snapshot of the cached documents, in map order.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let state = self.lock_loaded()?;
        Ok(state.documents.values().cloned().collect())
    }

    pub fn ids(&self) -> Result<Vec<DocumentId>> {
        let state = self.lock_loaded()?;
        Ok(state.documents.keys().cloned().collect())
    }

    /// Iterate over a snapshot taken under the lock. Changes made after the
    /// call are not visible to the iterator.
    pub fn iter(&self) -> Result<std::vec::IntoIter<Document>> {
        Ok(self.documents()?.into_iter())
    }

    /// Run `f` against the loaded map while holding the lock, for reads that
    /// must see one consistent state.
    ///
    /// `f` must not call back into this collection.
    pub fn with_documents<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&IndexMap<DocumentId, Document>) -> R,
    {
        let state = self.lock_loaded()?;
        Ok(f(&state.documents))
    }

    // --- Unsupported ---

    /// Membership is only defined by id; use [`get`](Self::get).
    pub fn contains(&self, _doc: &Document) -> Result<bool> {
        Err(CollectionError::Unsupported("contains"))
    }

    pub fn contains_all(&self, _docs: &[Document]) -> Result<bool> {
        Err(CollectionError::Unsupported("contains_all"))
    }

    /// Retaining by predicate is not defined over a replicated view.
    pub fn retain_all(&self, _docs: &[Document]) -> Result<bool> {
        Err(CollectionError::Unsupported("retain_all"))
    }

    // --- Events ---

    /// Apply one change event from the store's replication feed.
    ///
    /// Events arriving while unloaded are discarded, since the next load
    /// supersedes them. Callers must deliver events for a collection from a
    /// single thread, in feed order.
    pub fn on_event(&self, event: &ChangeEvent) -> MergeOutcome {
        self.observer.event_received(self.name(), event);

        let outcome = {
            let mut state = self.state.lock();
            if state.loaded {
                apply_event(&mut state.documents, event)
            } else {
                MergeOutcome::Skipped(SkipReason::Unloaded)
            }
        };

        if outcome.is_applied() {
            self.events_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.events_skipped.fetch_add(1, Ordering::Relaxed);
        }
        self.observer.event_merged(self.name(), event, &outcome);
        outcome
    }

    /// Start forwarding `feed` into this collection on a dedicated thread.
    pub fn subscribe(self: &Arc<Self>, feed: ChangeFeed) -> Result<EventSubscriber> {
        EventSubscriber::spawn(Arc::clone(self), feed)
    }

    fn store_addr(&self) -> *const () {
        Arc::as_ptr(&self.store) as *const ()
    }
}

impl PartialEq for ActiveCollection {
    fn eq(&self, other: &Self) -> bool {
        self.store_addr() == other.store_addr() && self.filter == other.filter
    }
}

impl Eq for ActiveCollection {}

impl Hash for ActiveCollection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.store_addr() as usize).hash(state);
        self.filter.hash(state);
    }
}

impl fmt::Display for ActiveCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "ActiveCollection({}, {})", self.name(), filter),
            None => write!(f, "ActiveCollection({}, None)", self.name()),
        }
    }
}

impl fmt::Debug for ActiveCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCollection")
            .field("store", &self.name())
            .field("filter", &self.filter)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
