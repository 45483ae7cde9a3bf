//! Queued mutation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::RecordId;

/// Identifies the target entity and operation of a queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationKey {
    /// Record being written
    pub record_id: RecordId,
    /// Operation name (e.g., "update-weight", "close-batch")
    pub operation: String,
}

impl MutationKey {
    /// Create a key for an operation against a record.
    pub fn new(record_id: RecordId, operation: impl Into<String>) -> Self {
        Self {
            record_id,
            operation: operation.into(),
        }
    }
}

/// Lifecycle status of a queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    /// Created but not yet dispatched
    #[default]
    Idle,
    /// Dispatched or queued for dispatch
    Pending,
    /// Applied by the server (terminal)
    Success,
    /// Retry budget exhausted (terminal)
    Error,
}

/// A single outstanding client-originated write.
///
/// `is_paused` is orthogonal to `status`: a mutation can be `Pending` and
/// paused at the same time, meaning "queued, waiting for connectivity".
/// `attempt_index` only increases for the lifetime of the mutation object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Target entity and operation
    pub key: MutationKey,
    /// Field changes the client intends to apply
    pub updates: Map<String, Value>,
    /// The `updated_at` the client believed it was editing against
    pub expected_base: DateTime<Utc>,
    /// When the client made the edit (local clock).
    ///
    /// Used only for the last-write-wins comparison; never adopted as a
    /// server-authoritative version stamp.
    pub edited_at: DateTime<Utc>,
    /// Lifecycle status
    pub status: MutationStatus,
    /// Deferred pending connectivity
    pub is_paused: bool,
    /// Failed network attempts so far
    pub attempt_index: u32,
}

impl QueuedMutation {
    /// Create a fresh mutation with a zeroed attempt counter, stamped with
    /// the local clock.
    #[must_use]
    pub fn new(key: MutationKey, updates: Map<String, Value>, expected_base: DateTime<Utc>) -> Self {
        Self {
            key,
            updates,
            expected_base,
            edited_at: Utc::now(),
            status: MutationStatus::Idle,
            is_paused: false,
            attempt_index: 0,
        }
    }

    /// Whether this mutation contributes to the pending count.
    ///
    /// Union of `Pending` status and the paused flag, with the caveat that a
    /// terminally failed mutation is never counted as pending.
    #[must_use]
    pub const fn counts_as_pending(&self) -> bool {
        match self.status {
            MutationStatus::Error => false,
            MutationStatus::Pending => true,
            MutationStatus::Idle | MutationStatus::Success => self.is_paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: MutationStatus, is_paused: bool) -> QueuedMutation {
        let mut m = QueuedMutation::new(
            MutationKey::new(RecordId::new(), "update-weight"),
            Map::new(),
            Utc::now(),
        );
        m.status = status;
        m.is_paused = is_paused;
        m
    }

    #[test]
    fn test_new_mutation_is_idle() {
        let m = sample(MutationStatus::Idle, false);
        assert_eq!(m.status, MutationStatus::Idle);
        assert_eq!(m.attempt_index, 0);
        assert!(!m.is_paused);
    }

    #[test]
    fn test_pending_counts_regardless_of_pause() {
        assert!(sample(MutationStatus::Pending, false).counts_as_pending());
        assert!(sample(MutationStatus::Pending, true).counts_as_pending());
    }

    #[test]
    fn test_paused_idle_counts_as_pending() {
        assert!(sample(MutationStatus::Idle, true).counts_as_pending());
        assert!(!sample(MutationStatus::Idle, false).counts_as_pending());
    }

    #[test]
    fn test_failed_mutation_never_pending() {
        assert!(!sample(MutationStatus::Error, false).counts_as_pending());
        assert!(!sample(MutationStatus::Error, true).counts_as_pending());
    }
}
