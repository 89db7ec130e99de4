//! Change event application.

use crate::events::{ChangeEvent, ChangeKind};
use crate::types::{Document, DocumentId};
use indexmap::IndexMap;

/// Why an event left the cached map untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The collection was not loaded; the next load supersedes the event.
    Unloaded,
    /// The event carried no usable id.
    MissingId,
    /// Delete for an id that is not cached.
    UnknownId,
}

/// Result of applying one change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Upsert for an uncached id; the changed fields became the document.
    Inserted,
    /// Upsert merged into the cached document.
    Merged,
    /// Delete removed the cached document.
    Removed,
    Skipped(SkipReason),
}

impl MergeOutcome {
    /// True if the cached map changed.
    pub fn is_applied(&self) -> bool {
        !matches!(self, MergeOutcome::Skipped(_))
    }
}

/// Apply a change event to a loaded id map.
///
/// Upserts merge shallowly: every top-level field in `changed_fields`
/// overwrites the cached one, everything else is kept. An upsert for an id
/// with no cached entry inserts the changed fields as the whole document.
pub fn apply_event(map: &mut IndexMap<DocumentId, Document>, event: &ChangeEvent) -> MergeOutcome {
    let Some(id) = event.id() else {
        return MergeOutcome::Skipped(SkipReason::MissingId);
    };

    match event.kind {
        ChangeKind::Delete => match map.shift_remove(&id) {
            Some(_) => MergeOutcome::Removed,
            None => MergeOutcome::Skipped(SkipReason::UnknownId),
        },

        ChangeKind::Upsert => match map.get_mut(&id) {
            Some(cached) => {
                let mut merged = cached.merged(&event.changed_fields);
                // A change cannot move a document to another id
                merged.set_id(&id);
                *cached = merged;
                MergeOutcome::Merged
            }
            None => {
                let doc = event.changed_fields.clone().with_id(&id);
                map.insert(id, doc);
                MergeOutcome::Inserted
            }
        },
    }
}
