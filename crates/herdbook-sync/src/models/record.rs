//! Versioned record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A unique identifier for a synced record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A persisted entity subject to concurrent edits.
///
/// `updated_at` is issued exclusively by the server on each successful write;
/// the client only ever holds a cached copy and never fabricates a version
/// stamp of its own. Domain fields are carried as a JSON object so the sync
/// core stays agnostic of which entity (batch, mortality record, invoice)
/// is being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    /// Unique identifier
    pub id: RecordId,
    /// Domain fields, opaque to the sync core
    pub fields: Map<String, Value>,
    /// Server-issued version stamp
    pub updated_at: DateTime<Utc>,
}

impl VersionedRecord {
    /// Build a record from a server snapshot.
    #[must_use]
    pub const fn new(id: RecordId, fields: Map<String, Value>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            fields,
            updated_at,
        }
    }

    /// Look up a domain field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
