//! herdbook-sync - Offline sync core for Herdbook
//!
//! This crate contains the offline write-conflict resolution and
//! mutation-retry logic shared by all Herdbook clients: last-write-wins
//! conflict resolution, deterministic exponential-backoff retry scheduling,
//! and the mutation queue coordinator that keeps a client usable while
//! disconnected and reconciles divergent state on reconnect.
//!
//! The surrounding application supplies the network transport and the
//! connectivity signal; everything in here is in-memory decision logic,
//! unit-testable without network or storage.

pub mod conflict;
pub mod error;
pub mod models;
pub mod queue;
pub mod retry;
pub mod state;

pub use conflict::{
    extract_conflict_data, has_conflict, merge_for_retry, resolve_conflict, ConflictDescriptor,
    ConflictError, Resolution, SyncTimestamp,
};
pub use error::{Error, Result, TransportError};
pub use models::{MutationKey, MutationStatus, QueuedMutation, RecordId, VersionedRecord};
pub use queue::{Coordinator, DispatchOutcome, MutationOutcome, MutationQueue, MutationTransport};
pub use retry::{retry_delay, RetryPolicy, MAX_RETRIES};
pub use state::{derive_sync_state, SyncState};
