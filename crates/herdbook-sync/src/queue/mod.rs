//! Mutation queue and coordinator.
//!
//! The queue is an explicit, owned structure: all mutation goes through
//! `&mut self`, preserving the single-writer discipline the sync protocol
//! assumes. Callers that need to share it across tasks wrap the owning
//! [`Coordinator`] in a `tokio::sync::Mutex`.

mod coordinator;

pub use coordinator::{Coordinator, DispatchOutcome, MutationOutcome, MutationTransport};

use std::collections::{HashMap, VecDeque};

use crate::models::{MutationKey, MutationStatus, QueuedMutation};

/// Outstanding client writes, FIFO per mutation key.
///
/// Mutations targeting the same key are dispatched in enqueue order so a
/// rebase always reapplies the most recent client intent; different keys
/// have no ordering relative to each other. Terminally failed mutations are
/// moved out of the active lanes but retained for the user to retry or
/// discard.
#[derive(Debug, Default)]
pub struct MutationQueue {
    lanes: HashMap<MutationKey, VecDeque<QueuedMutation>>,
    order: Vec<MutationKey>,
    failed: Vec<QueuedMutation>,
}

impl MutationQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation to its key's lane.
    pub fn enqueue(&mut self, mutation: QueuedMutation) {
        let key = mutation.key.clone();
        if !self.lanes.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.lanes.entry(key).or_default().push_back(mutation);
    }

    /// Keys with outstanding mutations, in first-enqueue order.
    #[must_use]
    pub fn active_keys(&self) -> Vec<MutationKey> {
        self.order
            .iter()
            .filter(|key| self.lanes.get(*key).is_some_and(|lane| !lane.is_empty()))
            .cloned()
            .collect()
    }

    /// Head of a key's lane, mutable.
    pub fn front_mut(&mut self, key: &MutationKey) -> Option<&mut QueuedMutation> {
        self.lanes.get_mut(key)?.front_mut()
    }

    /// Remove and return the head of a key's lane.
    pub fn pop_front(&mut self, key: &MutationKey) -> Option<QueuedMutation> {
        let lane = self.lanes.get_mut(key)?;
        let mutation = lane.pop_front();
        if lane.is_empty() {
            self.lanes.remove(key);
            self.order.retain(|k| k != key);
        }
        mutation
    }

    /// Discard paused, not-yet-dispatched mutations for a key.
    ///
    /// Returns how many were removed. Mutations already dispatched (pending
    /// and unpaused) are not cancellable mid-flight.
    pub fn cancel_paused(&mut self, key: &MutationKey) -> usize {
        let Some(lane) = self.lanes.get_mut(key) else {
            return 0;
        };
        let before = lane.len();
        lane.retain(|mutation| !mutation.is_paused);
        let removed = before - lane.len();
        if lane.is_empty() {
            self.lanes.remove(key);
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Pause every active mutation (connectivity lost).
    pub fn pause_all(&mut self) {
        for mutation in self.lanes.values_mut().flatten() {
            mutation.is_paused = true;
        }
    }

    /// Unpause every active mutation (connectivity restored).
    pub fn resume_all(&mut self) {
        for mutation in self.lanes.values_mut().flatten() {
            mutation.is_paused = false;
        }
    }

    /// Move a terminally failed mutation out of the active set.
    ///
    /// It stays visible via [`failed`](Self::failed) until retried or
    /// discarded. A failed mutation is never simultaneously paused.
    pub fn push_failed(&mut self, mut mutation: QueuedMutation) {
        mutation.status = MutationStatus::Error;
        mutation.is_paused = false;
        self.failed.push(mutation);
    }

    /// Terminally failed mutations awaiting user action.
    #[must_use]
    pub fn failed(&self) -> &[QueuedMutation] {
        &self.failed
    }

    /// Remove failed mutations for a key, returning them for manual retry.
    pub fn take_failed(&mut self, key: &MutationKey) -> Vec<QueuedMutation> {
        let (taken, kept) = self
            .failed
            .drain(..)
            .partition(|mutation| &mutation.key == key);
        self.failed = kept;
        taken
    }

    /// Drop failed mutations for a key without retrying them.
    pub fn discard_failed(&mut self, key: &MutationKey) -> usize {
        let before = self.failed.len();
        self.failed.retain(|mutation| &mutation.key != key);
        before - self.failed.len()
    }

    /// Mutations counted as pending: status `Pending` or paused, as a union.
    ///
    /// A mutation that is both pending and paused is counted once; a
    /// terminally failed mutation is never counted.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lanes
            .values()
            .flatten()
            .filter(|mutation| mutation.counts_as_pending())
            .count()
    }

    /// Mutations deferred pending connectivity.
    #[must_use]
    pub fn paused_count(&self) -> usize {
        self.lanes
            .values()
            .flatten()
            .filter(|mutation| mutation.is_paused)
            .count()
    }

    /// Mutations that exhausted their retry budget.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Active (not terminally failed) mutations across all lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.values().map(VecDeque::len).sum()
    }

    /// Whether no active mutations remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.values().all(VecDeque::is_empty)
    }
}
