//! Derived sync state shared by all client surfaces.

/// Aggregate sync status shown by the UI's sync indicator.
///
/// Derived from queue counts plus connectivity; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No connectivity
    Offline,
    /// At least one mutation exhausted its retry budget
    Failed,
    /// Mutations actively in flight
    Syncing,
    /// Mutations queued, waiting for connectivity or dispatch
    Pending,
    /// Nothing outstanding
    Synced,
}

/// Derive the aggregate sync state, evaluated in strict priority order:
/// offline, then failed, then syncing, then pending, then synced. Every
/// combination of inputs maps to exactly one state.
#[must_use]
pub const fn derive_sync_state(
    is_online: bool,
    pending_count: usize,
    paused_count: usize,
    failed_count: usize,
) -> SyncState {
    if !is_online {
        SyncState::Offline
    } else if failed_count > 0 {
        SyncState::Failed
    } else if pending_count > 0 && paused_count == 0 {
        SyncState::Syncing
    } else if paused_count > 0 {
        SyncState::Pending
    } else {
        SyncState::Synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_offline_overrides_everything() {
        assert_eq!(derive_sync_state(false, 0, 0, 0), SyncState::Offline);
        assert_eq!(derive_sync_state(false, 5, 3, 2), SyncState::Offline);
    }

    #[test]
    fn test_failed_beats_pending() {
        assert_eq!(derive_sync_state(true, 4, 0, 1), SyncState::Failed);
        assert_eq!(derive_sync_state(true, 0, 2, 1), SyncState::Failed);
    }

    #[test]
    fn test_in_flight_is_syncing() {
        assert_eq!(derive_sync_state(true, 2, 0, 0), SyncState::Syncing);
    }

    #[test]
    fn test_paused_queue_is_pending() {
        assert_eq!(derive_sync_state(true, 0, 3, 0), SyncState::Pending);
        // A paused mutation also counts as pending; paused still wins
        assert_eq!(derive_sync_state(true, 3, 3, 0), SyncState::Pending);
    }

    #[test]
    fn test_quiet_queue_is_synced() {
        assert_eq!(derive_sync_state(true, 0, 0, 0), SyncState::Synced);
    }
}
