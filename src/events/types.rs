//! Change event and feed types.

use crate::types::{identity_of, Document, DocumentId};
use serde::{Deserialize, Serialize};

/// What a change event did to a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Insert or update. `changed_fields` holds only what changed.
    Upsert,
    /// The document was removed.
    Delete,
}

/// An ordered notification of a mutation applied to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Id of the affected document. `None` marks a malformed event.
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    pub kind: ChangeKind,
    #[serde(default)]
    pub changed_fields: Document,
}

impl ChangeEvent {
    /// Upsert event for an explicit id.
    pub fn upsert(id: impl Into<DocumentId>, changed_fields: Document) -> Self {
        Self {
            document_id: Some(id.into()),
            kind: ChangeKind::Upsert,
            changed_fields,
        }
    }

    /// Upsert event whose id is read from the `_id` of the changed fields.
    pub fn upsert_document(doc: Document) -> Self {
        Self {
            document_id: identity_of(&doc),
            kind: ChangeKind::Upsert,
            changed_fields: doc,
        }
    }

    /// Delete event for an id.
    pub fn delete(id: impl Into<DocumentId>) -> Self {
        Self {
            document_id: Some(id.into()),
            kind: ChangeKind::Delete,
            changed_fields: Document::new(),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }

    /// The event's id, falling back to the `_id` inside the changed fields.
    pub fn id(&self) -> Option<DocumentId> {
        self.document_id
            .clone()
            .or_else(|| identity_of(&self.changed_fields))
    }
}

/// Messages delivered on a change feed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// A change applied to the store.
    Change { event: ChangeEvent },

    /// The feed was dropped by its source; nothing follows.
    Dropped { reason: DropReason },
}

/// Why a feed was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Source shut down.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Configuration for a change feed.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Max buffered messages before the feed is dropped.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// Unique identifier for a feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeedId(pub u64);

/// Receiving end of an ordered change event stream.
pub struct ChangeFeed {
    pub id: FeedId,
    /// Channel to receive messages.
    pub receiver: crossbeam_channel::Receiver<FeedMessage>,
}

impl ChangeFeed {
    /// Build a feed from a raw channel, for sources other than
    /// [`ChangeFeedHub`](super::ChangeFeedHub).
    pub fn from_receiver(id: FeedId, receiver: crossbeam_channel::Receiver<FeedMessage>) -> Self {
        Self { id, receiver }
    }

    /// Receive the next message (blocking).
    pub fn recv(&self) -> Result<FeedMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> Result<FeedMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<FeedMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
