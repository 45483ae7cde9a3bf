//! Last-write-wins conflict detection and resolution.
//!
//! Pure decision functions over server/client version stamps, plus the
//! structured 409 error the transport layer reports when a write's expected
//! base no longer matches the server's current row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::Error;
use crate::models::VersionedRecord;

/// Reason tag carried by every conflict error.
pub const CONFLICT_REASON: &str = "CONFLICT";

/// HTTP-style status reported for version conflicts.
pub const CONFLICT_STATUS: u16 = 409;

/// Which side of a version conflict wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// The server's current row is kept; the client change is discarded
    ServerWins,
    /// The client change is rebased onto the server row and retried
    ClientWins,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerWins => write!(f, "server-wins"),
            Self::ClientWins => write!(f, "client-wins"),
        }
    }
}

/// A version stamp accepted at the API boundary.
///
/// Wraps an already-validated instant. ISO-8601 strings are converted via
/// [`FromStr`]; an unparseable string is rejected with
/// [`Error::InvalidInput`] before it can reach a comparison, so
/// [`resolve_conflict`] and [`has_conflict`] stay total functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncTimestamp(DateTime<Utc>);

impl SyncTimestamp {
    /// The wrapped instant.
    #[must_use]
    pub const fn instant(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for SyncTimestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl FromStr for SyncTimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<DateTime<Utc>>()
            .map(Self)
            .map_err(|error| Error::InvalidInput(format!("invalid timestamp {s:?}: {error}")))
    }
}

/// Decide which version wins under last-write-wins.
///
/// Returns [`Resolution::ClientWins`] iff the client instant is strictly
/// later than the server instant. Ties resolve to the server so an
/// equal-stamped concurrent write is never clobbered without an explicit
/// merge step.
#[must_use]
pub fn resolve_conflict(
    server_updated_at: impl Into<SyncTimestamp>,
    client_updated_at: impl Into<SyncTimestamp>,
) -> Resolution {
    if client_updated_at.into() > server_updated_at.into() {
        Resolution::ClientWins
    } else {
        Resolution::ServerWins
    }
}

/// Whether a write landed between the client's read and its attempted write.
///
/// True iff the server's current version is strictly newer than the base the
/// client believed it was editing. Equal or older server stamps are not
/// conflicts.
#[must_use]
pub fn has_conflict(
    server_updated_at: impl Into<SyncTimestamp>,
    client_expected_updated_at: impl Into<SyncTimestamp>,
) -> bool {
    server_updated_at.into() > client_expected_updated_at.into()
}

/// Structured conflict payload extracted from a [`ConflictError`].
///
/// Constructed the instant a write response signals a version mismatch and
/// consumed immediately by the coordinator; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDescriptor {
    /// The record as currently stored by the server
    pub server_version: VersionedRecord,
    /// The record as the client attempted to write it
    pub client_version: VersionedRecord,
    /// Which side wins
    pub resolution: Resolution,
}

/// Version conflict reported for a dispatched write (HTTP 409).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Version conflict on record {}: {} (HTTP {})", .server_version.id, .resolution, .status)]
pub struct ConflictError {
    /// Always [`CONFLICT_REASON`]
    pub reason: &'static str,
    /// Always [`CONFLICT_STATUS`]
    pub status: u16,
    /// The record as currently stored by the server
    pub server_version: VersionedRecord,
    /// The record as the client attempted to write it
    pub client_version: VersionedRecord,
    /// Resolution computed from the two snapshots' `updated_at` stamps
    pub resolution: Resolution,
}

impl ConflictError {
    /// Build a conflict error from the two record snapshots.
    ///
    /// The resolution is computed from the snapshots' `updated_at` stamps
    /// via [`resolve_conflict`].
    #[must_use]
    pub fn new(server_version: VersionedRecord, client_version: VersionedRecord) -> Self {
        let resolution = resolve_conflict(server_version.updated_at, client_version.updated_at);
        Self {
            reason: CONFLICT_REASON,
            status: CONFLICT_STATUS,
            server_version,
            client_version,
            resolution,
        }
    }
}

/// Pull the conflict payload out of an error, if it is one.
///
/// Returns `None` for any error whose reason is not [`CONFLICT_REASON`],
/// letting the coordinator branch without coupling to the error's internals.
#[must_use]
pub fn extract_conflict_data(error: &Error) -> Option<ConflictDescriptor> {
    match error {
        Error::Conflict(conflict) if conflict.reason == CONFLICT_REASON => {
            Some(ConflictDescriptor {
                server_version: conflict.server_version.clone(),
                client_version: conflict.client_version.clone(),
                resolution: conflict.resolution,
            })
        }
        Error::Conflict(_) | Error::Transport(_) | Error::InvalidInput(_) => None,
    }
}

/// Rebase a client's intended field changes onto the current server row.
///
/// Every key present in `client_updates` overwrites the server value;
/// `id` and `updated_at` are always taken from the server, since the client
/// cannot dictate its own version stamp. Used to retry a client-wins
/// resolution against the now-current base without a second stale-base
/// conflict.
#[must_use]
pub fn merge_for_retry(
    server_version: &VersionedRecord,
    client_updates: &Map<String, Value>,
) -> VersionedRecord {
    let mut fields = server_version.fields.clone();
    for (key, value) in client_updates {
        fields.insert(key.clone(), value.clone());
    }
    VersionedRecord::new(server_version.id, fields, server_version.updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn record(updated_at: &str, fields: &[(&str, Value)]) -> VersionedRecord {
        let mut map = Map::new();
        for (key, value) in fields {
            map.insert((*key).to_string(), value.clone());
        }
        VersionedRecord::new(RecordId::new(), map, ts(updated_at))
    }

    #[test]
    fn test_client_wins_when_strictly_later() {
        let resolution = resolve_conflict(ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"));
        assert_eq!(resolution, Resolution::ClientWins);
    }

    #[test]
    fn test_server_wins_when_later_or_equal() {
        let earlier = ts("2024-01-01T00:00:00Z");
        let later = ts("2024-01-02T00:00:00Z");
        assert_eq!(resolve_conflict(later, earlier), Resolution::ServerWins);
        assert_eq!(resolve_conflict(earlier, earlier), Resolution::ServerWins);
    }

    #[test]
    fn test_resolution_antisymmetric_for_distinct_stamps() {
        let a = ts("2024-03-05T10:00:00Z");
        let b = ts("2024-03-05T10:00:01Z");
        assert_eq!(resolve_conflict(a, b), Resolution::ClientWins);
        assert_eq!(resolve_conflict(b, a), Resolution::ServerWins);
    }

    #[test]
    fn test_has_conflict_only_when_server_strictly_newer() {
        let base = ts("2024-01-01T00:00:00Z");
        let newer = ts("2024-01-01T00:00:01Z");
        assert!(has_conflict(newer, base));
        assert!(!has_conflict(base, base));
        assert!(!has_conflict(base, newer));
    }

    #[test]
    fn test_timestamp_parses_iso8601() {
        let stamp: SyncTimestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(stamp.instant(), ts("2024-01-01T00:00:00Z"));

        // Offset forms normalize to the same instant
        let offset: SyncTimestamp = "2024-01-01T08:00:00+08:00".parse().unwrap();
        assert_eq!(offset, stamp);
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        let result = "not-a-date".parse::<SyncTimestamp>();
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_merge_keeps_server_identity_and_stamp() {
        let server = record(
            "2024-02-01T00:00:00Z",
            &[("head_count", json!(120)), ("notes", json!("healthy"))],
        );
        let mut updates = Map::new();
        updates.insert("head_count".to_string(), json!(118));

        let merged = merge_for_retry(&server, &updates);
        assert_eq!(merged.id, server.id);
        assert_eq!(merged.updated_at, server.updated_at);
        assert_eq!(merged.field("head_count"), Some(&json!(118)));
        assert_eq!(merged.field("notes"), Some(&json!("healthy")));
    }

    #[test]
    fn test_merge_null_overwrites_but_absent_does_not() {
        let server = record("2024-02-01T00:00:00Z", &[("notes", json!("healthy"))]);
        let mut updates = Map::new();
        updates.insert("notes".to_string(), Value::Null);

        let merged = merge_for_retry(&server, &updates);
        assert_eq!(merged.field("notes"), Some(&Value::Null));

        let untouched = merge_for_retry(&server, &Map::new());
        assert_eq!(untouched.fields, server.fields);
    }

    #[test]
    fn test_conflict_error_round_trip() {
        let server = record("2024-01-01T00:00:00Z", &[("egg_count", json!(300))]);
        let client = record("2024-01-02T00:00:00Z", &[("egg_count", json!(310))]);

        let error = Error::from(ConflictError::new(server.clone(), client.clone()));
        let descriptor = extract_conflict_data(&error).unwrap();
        assert_eq!(descriptor.server_version, server);
        assert_eq!(descriptor.client_version, client);
        assert_eq!(descriptor.resolution, Resolution::ClientWins);
    }

    #[test]
    fn test_extract_returns_none_for_other_errors() {
        use crate::error::TransportError;

        assert_eq!(
            extract_conflict_data(&Error::Transport(TransportError::Timeout)),
            None
        );
        assert_eq!(
            extract_conflict_data(&Error::InvalidInput("nope".to_string())),
            None
        );
    }

    #[test]
    fn test_conflict_error_carries_409() {
        let server = record("2024-01-01T00:00:00Z", &[]);
        let client = record("2024-01-01T00:00:00Z", &[]);
        let error = ConflictError::new(server, client);
        assert_eq!(error.status, 409);
        assert_eq!(error.reason, "CONFLICT");
        assert_eq!(error.resolution, Resolution::ServerWins);
    }
}
