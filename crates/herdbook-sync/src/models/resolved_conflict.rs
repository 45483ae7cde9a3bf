//! Resolved conflict audit model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordId;
use crate::conflict::Resolution;

/// Strategy name recorded for every resolution this core performs.
pub const LWW_STRATEGY: &str = "last-write-wins";

/// Recorded sync conflict resolved by strategy (LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    /// Record involved in the conflict
    pub record_id: RecordId,
    /// Server row's timestamp when the conflict occurred
    pub server_updated_at: DateTime<Utc>,
    /// Client row's timestamp that collided with it
    pub client_updated_at: DateTime<Utc>,
    /// When the resolution was made
    pub resolved_at: DateTime<Utc>,
    /// Resolution strategy name
    pub strategy: String,
    /// Which side won
    pub resolution: Resolution,
}

impl ResolvedConflict {
    /// Record a last-write-wins resolution made right now.
    #[must_use]
    pub fn record(
        record_id: RecordId,
        server_updated_at: DateTime<Utc>,
        client_updated_at: DateTime<Utc>,
        resolution: Resolution,
    ) -> Self {
        Self {
            record_id,
            server_updated_at,
            client_updated_at,
            resolved_at: Utc::now(),
            strategy: LWW_STRATEGY.to_string(),
            resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_carries_strategy_name() {
        let entry = ResolvedConflict::record(
            RecordId::new(),
            "2024-01-01T00:00:00Z".parse().unwrap(),
            "2024-01-02T00:00:00Z".parse().unwrap(),
            Resolution::ClientWins,
        );
        assert_eq!(entry.strategy, "last-write-wins");
        assert_eq!(entry.resolution, Resolution::ClientWins);
    }
}
