//! Exponential backoff retry scheduling.
//!
//! Pure and stateless: the delay for an attempt depends only on the attempt
//! index. Transport failures consume the retry budget; a failure while the
//! client believes it is offline pauses the mutation instead, so losing
//! connectivity never burns attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Failed network attempts allowed before a mutation is terminally failed.
pub const MAX_RETRIES: u32 = 3;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 30_000;

/// Backoff delay before re-dispatching a failed mutation.
///
/// `min(1000ms * 2^attempt_index, 30s)`: attempt 0 waits exactly one second,
/// the delay doubles per attempt until the 30-second ceiling, then stays
/// constant. Always strictly positive.
#[must_use]
pub fn retry_delay(attempt_index: u32) -> Duration {
    RetryPolicy::default().delay_for(attempt_index)
}

/// Configurable retry policy; the defaults are what the app ships with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Backoff ceiling, in milliseconds
    pub max_delay_ms: u64,
    /// Failed attempts before a mutation is terminally failed
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Reject configurations that would stall or invert the backoff curve.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidInput(
                "retry base delay must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::InvalidInput(format!(
                "retry delay ceiling {}ms is below the base delay {}ms",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }

    /// Backoff delay for the given attempt, capped at the ceiling.
    #[must_use]
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    /// Whether a mutation with this many failed attempts is out of budget.
    #[must_use]
    pub const fn is_exhausted(&self, attempt_index: u32) -> bool {
        attempt_index >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_attempt_waits_one_second() {
        assert_eq!(retry_delay(0), Duration::from_millis(1_000));
    }

    #[test]
    fn test_delay_doubles_below_ceiling() {
        assert_eq!(retry_delay(1), Duration::from_millis(2_000));
        assert_eq!(retry_delay(2), Duration::from_millis(4_000));
        assert_eq!(retry_delay(3), Duration::from_millis(8_000));
        assert_eq!(retry_delay(4), Duration::from_millis(16_000));
    }

    #[test]
    fn test_delay_caps_at_thirty_seconds() {
        // 1000 * 2^5 = 32000 > 30000
        assert_eq!(retry_delay(5), Duration::from_millis(30_000));
        assert_eq!(retry_delay(20), Duration::from_millis(30_000));
    }

    #[test]
    fn test_delay_survives_huge_attempt_indices() {
        assert_eq!(retry_delay(u32::MAX), Duration::from_millis(30_000));
        assert_eq!(retry_delay(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_delay_always_positive_and_bounded() {
        for attempt in 0..40 {
            let delay = retry_delay(attempt);
            assert!(delay > Duration::ZERO);
            assert!(delay <= Duration::from_millis(30_000));
        }
    }

    #[test]
    fn test_default_policy_matches_free_function() {
        let policy = RetryPolicy::default();
        for attempt in 0..10 {
            assert_eq!(policy.delay_for(attempt), retry_delay(attempt));
        }
        assert_eq!(policy.max_retries, MAX_RETRIES);
    }

    #[test]
    fn test_exhaustion_at_max_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let zero_base = RetryPolicy {
            base_delay_ms: 0,
            ..RetryPolicy::default()
        };
        assert!(zero_base.validate().is_err());

        let inverted = RetryPolicy {
            base_delay_ms: 5_000,
            max_delay_ms: 1_000,
            ..RetryPolicy::default()
        };
        assert!(inverted.validate().is_err());

        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());

        let custom: RetryPolicy = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(custom.max_retries, 5);
        assert_eq!(custom.base_delay_ms, 1_000);
    }
}
