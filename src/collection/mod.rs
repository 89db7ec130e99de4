//! Active collections and the change-event merge policy.

mod active;
mod merge;

pub use active::{ActiveCollection, CollectionConfig};
pub use merge::{apply_event, MergeOutcome, SkipReason};
