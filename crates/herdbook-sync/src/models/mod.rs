//! Data models for the sync core

mod mutation;
mod record;
mod resolved_conflict;

pub use mutation::{MutationKey, MutationStatus, QueuedMutation};
pub use record::{RecordId, VersionedRecord};
pub use resolved_conflict::{ResolvedConflict, LWW_STRATEGY};
