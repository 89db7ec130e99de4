//! In-memory document store that publishes its writes as change events.

use crate::error::Result;
use crate::events::{ChangeEvent, ChangeFeed, ChangeFeedHub, FeedConfig};
use crate::types::{identity_of, Document, DocumentId, Filter};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::{DocumentStore, SaveResult};

/// A document store held in process memory.
///
/// Documents keep insertion order. Every write is broadcast on the store's
/// [`ChangeFeedHub`], so an active collection subscribed to it stays current
/// with writes made through any handle, not just its own.
pub struct MemoryStore {
    name: String,

    /// Documents by id, in insertion order.
    documents: RwLock<IndexMap<DocumentId, Document>>,

    /// Serializes writes so published events match the applied order.
    write_lock: Mutex<()>,

    /// Change feed broadcaster.
    feeds: ChangeFeedHub,

    /// Counter for generated object ids.
    next_oid: AtomicU64,

    /// Number of `find` calls served.
    find_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(IndexMap::new()),
            write_lock: Mutex::new(()),
            feeds: ChangeFeedHub::new(),
            next_oid: AtomicU64::new(1),
            find_calls: AtomicUsize::new(0),
        }
    }

    /// The broadcaster carrying this store's change events.
    pub fn feeds(&self) -> &ChangeFeedHub {
        &self.feeds
    }

    /// Open a change feed with the default buffer size.
    pub fn subscribe(&self) -> ChangeFeed {
        self.feeds.subscribe(FeedConfig::default())
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Read a document directly, bypassing any mirror.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.documents.read().get(id).cloned()
    }

    fn next_object_id(&self) -> DocumentId {
        let n = self.next_oid.fetch_add(1, Ordering::SeqCst);
        DocumentId::object_id(format!("{:024x}", n))
    }
}

/// Fields of `new` that differ from `old`. `None` when `new` dropped a field
/// of `old`, which an upsert event cannot express.
fn changed_fields(old: &Document, new: &Document) -> Option<Document> {
    if old.fields().any(|(field, _)| !new.contains_field(field)) {
        return None;
    }

    let mut changes = Document::new();
    for (field, value) in new.fields() {
        if old.get(field) != Some(value) {
            changes.insert(field.clone(), value.clone());
        }
    }
    Some(changes)
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: Option<&Filter>) -> Result<Vec<Document>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);

        let documents = self.documents.read();
        let found = documents
            .values()
            .filter(|doc| filter.map_or(true, |f| f.matches(doc)))
            .cloned()
            .collect();
        Ok(found)
    }

    fn save(&self, doc: &Document) -> Result<SaveResult> {
        let _lock = self.write_lock.lock();

        let mut doc = doc.clone();
        let id = match doc.checked_id()? {
            Some(id) => id,
            None => {
                let id = self.next_object_id();
                doc.set_id(&id);
                id
            }
        };

        let previous = self.documents.write().insert(id.clone(), doc.clone());

        match previous {
            None => self.feeds.publish(ChangeEvent::upsert(id.clone(), doc)),
            Some(old) => match changed_fields(&old, &doc) {
                Some(changes) => self.feeds.publish(ChangeEvent::upsert(id.clone(), changes)),
                None => {
                    // Replacement removed fields: re-insert from scratch
                    self.feeds.publish(ChangeEvent::delete(id.clone()));
                    self.feeds.publish(ChangeEvent::upsert(id.clone(), doc));
                }
            },
        }

        tracing::trace!(store = %self.name, id = %id, "saved document");
        Ok(SaveResult {
            assigned_id: Some(id),
        })
    }

    fn remove(&self, doc: &Document) -> Result<()> {
        let _lock = self.write_lock.lock();

        let Some(id) = identity_of(doc) else {
            return Ok(());
        };

        if self.documents.write().shift_remove(&id).is_some() {
            self.feeds.publish(ChangeEvent::delete(id.clone()));
            tracing::trace!(store = %self.name, id = %id, "removed document");
        }
        Ok(())
    }

    fn drop_all(&self) -> Result<()> {
        let _lock = self.write_lock.lock();

        let dropped: Vec<DocumentId> = self.documents.write().drain(..).map(|(id, _)| id).collect();
        tracing::debug!(store = %self.name, count = dropped.len(), "dropped collection");

        for id in dropped {
            self.feeds.publish(ChangeEvent::delete(id));
        }
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.feeds.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectionError;
    use crate::events::{ChangeKind, FeedMessage};
    use serde_json::json;
    use std::time::Duration;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn next_event(feed: &ChangeFeed) -> ChangeEvent {
        match feed.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedMessage::Change { event } => event,
            other => panic!("Expected Change, got {:?}", other),
        }
    }

    #[test]
    fn test_save_assigns_object_id() {
        let store = MemoryStore::new("people");
        let result = store.save(&doc(json!({"name": "ada"}))).unwrap();

        let id = result.assigned_id.unwrap();
        assert!(matches!(id, DocumentId::ObjectId { .. }));
        assert_eq!(store.get(&id).unwrap().get("name"), Some(&json!("ada")));
    }

    #[test]
    fn test_save_keeps_caller_id() {
        let store = MemoryStore::new("people");
        let result = store.save(&doc(json!({"_id": 5, "name": "ada"}))).unwrap();
        assert_eq!(result.assigned_id, Some(DocumentId::Int(5)));
    }

    #[test]
    fn test_save_rejects_unusable_id() {
        let store = MemoryStore::new("people");
        let feed = store.subscribe();

        let err = store
            .save(&doc(json!({"_id": u64::MAX, "name": "ada"})))
            .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidDocument(_)));
        assert!(store.is_empty());
        assert!(feed.try_recv().is_err());

        // A null id is treated as absent
        let result = store.save(&doc(json!({"_id": null, "name": "bob"}))).unwrap();
        assert!(matches!(result.assigned_id, Some(DocumentId::ObjectId { .. })));
    }

    #[test]
    fn test_find_with_filter_preserves_order() {
        let store = MemoryStore::new("tasks");
        for (i, kind) in ["a", "b", "a", "a"].iter().enumerate() {
            store
                .save(&doc(json!({"_id": i as i64, "kind": kind})))
                .unwrap();
        }

        let found = store.find(Some(&Filter::field("kind", "a"))).unwrap();
        let ids: Vec<_> = found.iter().filter_map(|d| d.id()).collect();
        assert_eq!(
            ids,
            vec![DocumentId::Int(0), DocumentId::Int(2), DocumentId::Int(3)]
        );
        assert_eq!(store.find(None).unwrap().len(), 4);
        assert_eq!(store.find_calls(), 2);
    }

    #[test]
    fn test_update_publishes_changed_fields_only() {
        let store = MemoryStore::new("tasks");
        let feed = store.subscribe();

        store.save(&doc(json!({"_id": 1, "a": 1, "b": 2}))).unwrap();
        let insert = next_event(&feed);
        assert_eq!(insert.changed_fields, doc(json!({"_id": 1, "a": 1, "b": 2})));

        store.save(&doc(json!({"_id": 1, "a": 1, "b": 3}))).unwrap();
        let update = next_event(&feed);
        assert_eq!(update.kind, ChangeKind::Upsert);
        assert_eq!(update.document_id, Some(DocumentId::Int(1)));
        assert_eq!(update.changed_fields, doc(json!({"b": 3})));
    }

    #[test]
    fn test_replacement_dropping_fields_reinserts() {
        let store = MemoryStore::new("tasks");
        store.save(&doc(json!({"_id": 1, "a": 1, "b": 2}))).unwrap();
        let feed = store.subscribe();

        store.save(&doc(json!({"_id": 1, "a": 1}))).unwrap();
        assert!(next_event(&feed).is_delete());
        let reinsert = next_event(&feed);
        assert_eq!(reinsert.changed_fields, doc(json!({"_id": 1, "a": 1})));
    }

    #[test]
    fn test_remove_and_drop_publish_deletes() {
        let store = MemoryStore::new("tasks");
        store.save(&doc(json!({"_id": 1}))).unwrap();
        store.save(&doc(json!({"_id": 2}))).unwrap();
        store.save(&doc(json!({"_id": 3}))).unwrap();
        let feed = store.subscribe();

        store.remove(&doc(json!({"_id": 2}))).unwrap();
        store.remove(&doc(json!({"_id": 99}))).unwrap();
        store.drop_all().unwrap();

        let ids: Vec<_> = (0..3).map(|_| next_event(&feed).document_id.unwrap()).collect();
        assert_eq!(
            ids,
            vec![DocumentId::Int(2), DocumentId::Int(1), DocumentId::Int(3)]
        );
        assert!(feed.try_recv().is_err());
        assert!(store.is_empty());
    }
}
