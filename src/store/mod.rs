//! The persistent document store an active collection mirrors.
//!
//! The store's query and write engine live outside this crate; they are
//! reached through the [`DocumentStore`] trait. [`MemoryStore`] is an
//! in-process implementation that also publishes its own writes as change
//! events.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Document, DocumentId, Filter};

/// Outcome of a successful save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveResult {
    /// Id assigned by the store, if it reports one.
    pub assigned_id: Option<DocumentId>,
}

/// A persistent document collection.
///
/// Failures are reported as [`CollectionError::Store`](crate::CollectionError::Store)
/// and reach callers of the active collection unchanged.
pub trait DocumentStore: Send + Sync {
    /// Human-readable name, used in `Display` output and logs.
    fn name(&self) -> &str;

    /// Return the documents matching `filter` (all documents when `None`),
    /// in the store's natural order.
    fn find(&self, filter: Option<&Filter>) -> Result<Vec<Document>>;

    /// Insert or replace a document, assigning an id when it has none.
    fn save(&self, doc: &Document) -> Result<SaveResult>;

    /// Delete the document with the same identity.
    fn remove(&self, doc: &Document) -> Result<()>;

    /// Delete every document in the collection.
    fn drop_all(&self) -> Result<()>;
}
