//! Mutation lifecycle coordination.
//!
//! The coordinator owns the mutation queue, a cache of the latest known
//! server rows, and the connectivity flag. It drives dispatch through a
//! caller-supplied transport, resolves 409 conflicts deterministically, and
//! applies the backoff/attempt-cap policy to transport failures. Every
//! dispatch settlement is a handled branch; nothing escapes as a panic or an
//! unhandled error.

use std::collections::HashMap;
use std::future::Future;

use serde_json::{Map, Value};

use crate::conflict::{extract_conflict_data, merge_for_retry, ConflictError, Resolution, CONFLICT_STATUS};
use crate::error::{Error, Result, TransportError};
use crate::models::{
    MutationKey, MutationStatus, QueuedMutation, RecordId, ResolvedConflict, VersionedRecord,
};
use crate::queue::MutationQueue;
use crate::retry::RetryPolicy;
use crate::state::{derive_sync_state, SyncState};

/// Settlement of a single dispatched mutation, as reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The server applied the write and issued a fresh version stamp
    Applied(VersionedRecord),
    /// The server rejected the write with a version conflict
    Conflict(ConflictError),
    /// The request never settled cleanly (timeout, 5xx, dropped connection)
    Failed(TransportError),
}

/// Terminal outcome of a mutation's trip through the queue.
///
/// `Discarded` is distinct from `Applied`: the client's change was dropped
/// in favor of the server row, which is not a plain success.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The write landed; the returned row is the new server state
    Applied(VersionedRecord),
    /// Conflict resolved server-wins; the server row was adopted locally
    Discarded(VersionedRecord),
    /// Retry budget exhausted; user action required
    Failed(TransportError),
}

/// Network boundary supplied by the surrounding application.
///
/// `client_version` is the record as the client wants it written: the cached
/// base with the mutation's updates applied. Its `updated_at` is the local
/// edit stamp, carried for the server's last-write-wins comparison only.
pub trait MutationTransport {
    /// Send one mutation and await its settlement.
    fn dispatch(
        &mut self,
        mutation: &QueuedMutation,
        client_version: &VersionedRecord,
    ) -> impl Future<Output = DispatchOutcome>;
}

/// Owns the outstanding writes and decides when they are retried, rebased,
/// or surfaced to the user.
///
/// Single-writer by construction: all queue and cache mutation goes through
/// `&mut self` on whichever task owns the coordinator. Callers that need to
/// share it wrap it in a `tokio::sync::Mutex`.
pub struct Coordinator<T> {
    transport: T,
    queue: MutationQueue,
    cache: HashMap<RecordId, VersionedRecord>,
    policy: RetryPolicy,
    is_online: bool,
    resolved: Vec<ResolvedConflict>,
}

impl<T: MutationTransport> Coordinator<T> {
    /// Create a coordinator with the default retry policy, assumed online.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            queue: MutationQueue::new(),
            cache: HashMap::new(),
            policy: RetryPolicy::default(),
            is_online: true,
            resolved: Vec::new(),
        }
    }

    /// Create a coordinator with a custom retry policy.
    pub fn with_policy(transport: T, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        let mut coordinator = Self::new(transport);
        coordinator.policy = policy;
        Ok(coordinator)
    }

    /// Adopt a server snapshot into the local cache.
    ///
    /// Records must be tracked before mutations against them can be queued.
    pub fn track_record(&mut self, record: VersionedRecord) {
        self.cache.insert(record.id, record);
    }

    /// Latest known server state for a record.
    #[must_use]
    pub fn record(&self, id: &RecordId) -> Option<&VersionedRecord> {
        self.cache.get(id)
    }

    /// Current connectivity belief.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.is_online
    }

    /// Update the connectivity signal, pausing or releasing the queue.
    ///
    /// The caller drives an actual sync pass (via [`sync_once`](Self::sync_once))
    /// after reconnecting.
    pub fn set_online(&mut self, online: bool) {
        if self.is_online == online {
            return;
        }
        self.is_online = online;
        if online {
            tracing::debug!("connectivity restored; releasing paused mutations");
            self.queue.resume_all();
        } else {
            tracing::debug!("connectivity lost; pausing queued mutations");
            self.queue.pause_all();
        }
    }

    /// Queue a write against a tracked record.
    ///
    /// The mutation is marked paused immediately when the client believes it
    /// is offline. Returns the key under which it was queued.
    pub fn enqueue(
        &mut self,
        record_id: RecordId,
        operation: impl Into<String>,
        updates: Map<String, Value>,
    ) -> Result<MutationKey> {
        let Some(base) = self.cache.get(&record_id) else {
            return Err(Error::InvalidInput(format!(
                "record {record_id} is not tracked"
            )));
        };
        let operation = operation.into();
        if operation.trim().is_empty() {
            return Err(Error::InvalidInput(
                "operation name must not be empty".to_string(),
            ));
        }

        let key = MutationKey::new(record_id, operation);
        let mut mutation = QueuedMutation::new(key.clone(), updates, base.updated_at);
        mutation.status = MutationStatus::Pending;
        mutation.is_paused = !self.is_online;
        tracing::debug!(record = %record_id, operation = %key.operation, paused = mutation.is_paused, "mutation queued");
        self.queue.enqueue(mutation);
        Ok(key)
    }

    /// Discard paused, not-yet-dispatched mutations for a key.
    pub fn cancel_paused(&mut self, key: &MutationKey) -> usize {
        self.queue.cancel_paused(key)
    }

    /// Re-queue terminally failed mutations for a key as fresh attempts.
    ///
    /// Each comes back as a new mutation object: attempt counter zeroed,
    /// expected base refreshed from the cache. Returns how many were
    /// re-queued.
    pub fn retry_failed(&mut self, key: &MutationKey) -> usize {
        let failed = self.queue.take_failed(key);
        let mut requeued = 0;
        for old in failed {
            let Some(base) = self.cache.get(&key.record_id) else {
                tracing::warn!(record = %key.record_id, "cannot retry mutation for untracked record");
                continue;
            };
            let mut fresh = QueuedMutation::new(old.key, old.updates, base.updated_at);
            fresh.status = MutationStatus::Pending;
            fresh.is_paused = !self.is_online;
            self.queue.enqueue(fresh);
            requeued += 1;
        }
        requeued
    }

    /// Drop terminally failed mutations for a key without retrying them.
    pub fn discard_failed(&mut self, key: &MutationKey) -> usize {
        self.queue.discard_failed(key)
    }

    /// Mutations counted as pending (status `Pending` or paused, as a union).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// Mutations deferred pending connectivity.
    #[must_use]
    pub fn paused_count(&self) -> usize {
        self.queue.paused_count()
    }

    /// Mutations that exhausted their retry budget.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.queue.failed_count()
    }

    /// Terminally failed mutations awaiting user action.
    #[must_use]
    pub fn failed(&self) -> &[QueuedMutation] {
        self.queue.failed()
    }

    /// Audit log of every conflict this coordinator has resolved.
    #[must_use]
    pub fn resolved_conflicts(&self) -> &[ResolvedConflict] {
        &self.resolved
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Aggregate sync status for the UI's sync indicator.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        derive_sync_state(
            self.is_online,
            self.queue.pending_count(),
            self.queue.paused_count(),
            self.queue.failed_count(),
        )
    }

    /// Drain every lane once, in first-enqueue order of keys.
    ///
    /// Mutations for the same key are dispatched strictly FIFO; an
    /// offline-style transport failure stops that lane (the mutation
    /// repauses) without touching other lanes. Returns the terminal outcomes
    /// reached during this pass.
    pub async fn sync_once(&mut self) -> Vec<(MutationKey, MutationOutcome)> {
        let mut outcomes = Vec::new();
        for key in self.queue.active_keys() {
            self.drain_lane(&key, &mut outcomes).await;
        }
        outcomes
    }

    async fn drain_lane(
        &mut self,
        key: &MutationKey,
        outcomes: &mut Vec<(MutationKey, MutationOutcome)>,
    ) {
        'mutations: loop {
            if self.queue.front_mut(key).is_none() {
                break;
            }
            // A client-wins rebase carries the merged record into the next
            // attempt of the same mutation.
            let mut rebased: Option<VersionedRecord> = None;

            loop {
                let Some(front) = self.queue.front_mut(key) else {
                    break 'mutations;
                };
                front.status = MutationStatus::Pending;
                front.is_paused = false;
                let mutation = front.clone();

                let client_version = match rebased.clone() {
                    Some(record) => record,
                    None => match self.cache.get(&key.record_id) {
                        Some(base) => client_version_from(base, &mutation),
                        None => {
                            tracing::warn!(record = %key.record_id, "dropping mutation for untracked record");
                            self.queue.pop_front(key);
                            continue 'mutations;
                        }
                    },
                };

                match self.transport.dispatch(&mutation, &client_version).await {
                    DispatchOutcome::Applied(record) => {
                        tracing::debug!(record = %record.id, operation = %key.operation, "mutation applied");
                        self.cache.insert(record.id, record.clone());
                        self.queue.pop_front(key);
                        outcomes.push((key.clone(), MutationOutcome::Applied(record)));
                        continue 'mutations;
                    }
                    DispatchOutcome::Conflict(conflict) => {
                        let error = Error::Conflict(conflict);
                        let Some(descriptor) = extract_conflict_data(&error) else {
                            // A 409 without a usable payload cannot be
                            // resolved; surface it as a terminal failure.
                            tracing::warn!(record = %key.record_id, "conflict response without payload");
                            if let Some(failed) = self.queue.pop_front(key) {
                                self.queue.push_failed(failed);
                            }
                            outcomes.push((
                                key.clone(),
                                MutationOutcome::Failed(TransportError::Status(CONFLICT_STATUS)),
                            ));
                            continue 'mutations;
                        };

                        self.resolved.push(ResolvedConflict::record(
                            key.record_id,
                            descriptor.server_version.updated_at,
                            descriptor.client_version.updated_at,
                            descriptor.resolution,
                        ));
                        // Either way the server row is the latest known state.
                        self.cache.insert(
                            descriptor.server_version.id,
                            descriptor.server_version.clone(),
                        );

                        match descriptor.resolution {
                            Resolution::ServerWins => {
                                tracing::debug!(record = %key.record_id, "conflict resolved server-wins; client change discarded");
                                self.queue.pop_front(key);
                                outcomes.push((
                                    key.clone(),
                                    MutationOutcome::Discarded(descriptor.server_version),
                                ));
                                continue 'mutations;
                            }
                            Resolution::ClientWins => {
                                let Some(front) = self.queue.front_mut(key) else {
                                    break 'mutations;
                                };
                                front.attempt_index += 1;
                                front.expected_base = descriptor.server_version.updated_at;

                                if self.policy.is_exhausted(front.attempt_index) {
                                    // A write storm keeps moving the base out
                                    // from under us; stop chasing it and
                                    // adopt the server row.
                                    tracing::warn!(record = %key.record_id, "rebase budget exhausted; adopting server row");
                                    self.queue.pop_front(key);
                                    outcomes.push((
                                        key.clone(),
                                        MutationOutcome::Discarded(descriptor.server_version),
                                    ));
                                    continue 'mutations;
                                }

                                tracing::debug!(record = %key.record_id, attempt = front.attempt_index, "conflict resolved client-wins; rebasing onto server row");
                                rebased = Some(merge_for_retry(
                                    &descriptor.server_version,
                                    &mutation.updates,
                                ));
                            }
                        }
                    }
                    DispatchOutcome::Failed(error) => {
                        if !self.is_online {
                            // Offline-first: the attempt was allowed, but its
                            // failure repauses the mutation without consuming
                            // the retry budget.
                            tracing::debug!(record = %key.record_id, %error, "offline dispatch failure; mutation paused");
                            if let Some(front) = self.queue.front_mut(key) {
                                front.is_paused = true;
                            }
                            break 'mutations;
                        }

                        let attempt = mutation.attempt_index;
                        let Some(front) = self.queue.front_mut(key) else {
                            break 'mutations;
                        };
                        front.attempt_index = attempt + 1;

                        if self.policy.is_exhausted(front.attempt_index) {
                            tracing::warn!(record = %key.record_id, %error, "retry budget exhausted; mutation failed");
                            if let Some(failed) = self.queue.pop_front(key) {
                                self.queue.push_failed(failed);
                            }
                            outcomes.push((key.clone(), MutationOutcome::Failed(error)));
                            continue 'mutations;
                        }

                        let delay = self.policy.delay_for(attempt);
                        tracing::debug!(record = %key.record_id, %error, ?delay, "transport failure; backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

/// The record as the client wants it written: cached base plus the
/// mutation's updates, stamped with the local edit time.
fn client_version_from(base: &VersionedRecord, mutation: &QueuedMutation) -> VersionedRecord {
    let mut fields = base.fields.clone();
    for (name, value) in &mutation.updates {
        fields.insert(name.clone(), value.clone());
    }
    VersionedRecord::new(base.id, fields, mutation.edited_at)
}
