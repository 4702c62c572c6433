//! Reconnect policy with bounded exponential backoff
//!
//! Delay for attempt `n` (0-based) is `2^n` backoff units, so a default
//! policy yields 1s, 2s, 4s, 8s, 16s and then gives up. No jitter is added:
//! a client has exactly one connection per handle.

use std::time::Duration;

use crate::config::constants::{DEFAULT_BACKOFF_UNIT_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS};

/// Close code for a normal closure (RFC 6455 §7.4.1)
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries scheduled after consecutive abnormal closes before giving up
    pub max_attempts: u32,
    /// One backoff time unit
    pub backoff_unit: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    /// Delay before the retry scheduled at `attempt`, or `None` once the
    /// bound is reached.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| backoff_delay(self.backoff_unit, attempt))
    }
}

/// `unit * 2^attempt`, saturating instead of overflowing.
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(2u32.saturating_pow(attempt))
}

/// How a close must be treated by the reconnect logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Initiated by this side with a normal-closure code; never reconnects
    Intentional,
    /// Anything else; drives bounded reconnection
    Abnormal,
}

/// Classify a close. A remote close is abnormal even with code 1000.
pub fn classify_close(code: Option<u16>, locally_initiated: bool) -> CloseKind {
    if locally_initiated && code == Some(NORMAL_CLOSURE) {
        CloseKind::Intentional
    } else {
        CloseKind::Abnormal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_delay_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..policy.max_attempts)
            .filter_map(|attempt| policy.next_delay(attempt))
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(policy.next_delay(5), None);
    }

    #[test]
    fn test_zero_attempts_never_schedules() {
        let policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.next_delay(0), None);
    }

    #[test]
    fn test_classify_close() {
        assert_eq!(classify_close(Some(1000), true), CloseKind::Intentional);
        assert_eq!(classify_close(Some(1000), false), CloseKind::Abnormal);
        assert_eq!(classify_close(Some(1006), true), CloseKind::Abnormal);
        assert_eq!(classify_close(None, false), CloseKind::Abnormal);
    }

    proptest! {
        #[test]
        fn prop_delay_doubles(unit_ms in 1u64..10_000, attempt in 0u32..20) {
            let unit = Duration::from_millis(unit_ms);
            let current = backoff_delay(unit, attempt);
            let next = backoff_delay(unit, attempt + 1);
            prop_assert_eq!(next, current * 2);
        }

        #[test]
        fn prop_delay_never_panics(unit_ms in 0u64..u64::MAX / 2, attempt in 0u32..u32::MAX) {
            let delay = backoff_delay(Duration::from_millis(unit_ms), attempt);
            prop_assert!(delay >= Duration::from_millis(unit_ms));
        }

        #[test]
        fn prop_bound_is_respected(max in 0u32..32, attempt in 0u32..64) {
            let policy = ReconnectPolicy::new(max, Duration::from_millis(1));
            prop_assert_eq!(policy.next_delay(attempt).is_some(), attempt < max);
        }
    }
}
