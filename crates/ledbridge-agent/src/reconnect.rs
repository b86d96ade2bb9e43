// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reconnection backoff

use std::time::Duration;

/// Exponential backoff: `base`, `2·base`, `4·base`, ... capped at `max`
#[derive(Debug, Clone)]
pub struct ReconnectStrategy {
    base: Duration,
    max: Duration,
    /// Failures since the last reset
    current_attempt: u32,
    /// Maximum retry attempts (0 = infinite)
    max_attempts: u32,
}

impl ReconnectStrategy {
    /// # Arguments
    /// * `base` - Delay after the first failure
    /// * `max` - Ceiling for every delay
    /// * `max_attempts` - Maximum retry attempts (0 = infinite)
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            current_attempt: 0,
            max_attempts,
        }
    }

    /// Record a failure and get the delay before the next attempt, or `None`
    /// when retries are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.current_attempt = self.current_attempt.saturating_add(1);

        // base * 2^(attempt - 1); the shift is clamped so it cannot overflow
        let exp = (self.current_attempt - 1).min(31);
        let backoff = self
            .base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max));
        Some(backoff)
    }

    /// Reset the strategy (after successful connection)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn attempt_number(&self) -> u32 {
        self.current_attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.current_attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECS: fn(u64) -> Duration = Duration::from_secs;

    #[test]
    fn test_exponential_backoff() {
        let mut strategy = ReconnectStrategy::new(SECS(5), SECS(60), 0);

        assert_eq!(strategy.next_backoff(), Some(SECS(5)));
        assert_eq!(strategy.next_backoff(), Some(SECS(10)));
        assert_eq!(strategy.next_backoff(), Some(SECS(20)));
        assert_eq!(strategy.next_backoff(), Some(SECS(40)));
        assert_eq!(strategy.next_backoff(), Some(SECS(60)));
        for _ in 0..100 {
            assert_eq!(strategy.next_backoff(), Some(SECS(60)));
        }
    }

    #[test]
    fn test_max_attempts() {
        let mut strategy = ReconnectStrategy::new(Duration::from_millis(100), SECS(60), 2);

        assert!(!strategy.is_exhausted());
        assert!(strategy.next_backoff().is_some());
        assert!(strategy.next_backoff().is_some());
        assert!(strategy.is_exhausted());
        assert_eq!(strategy.next_backoff(), None);
    }

    #[test]
    fn test_reset() {
        let mut strategy = ReconnectStrategy::new(SECS(1), SECS(60), 0);

        strategy.next_backoff();
        strategy.next_backoff();
        assert_eq!(strategy.attempt_number(), 2);

        strategy.reset();
        assert_eq!(strategy.attempt_number(), 0);
        assert_eq!(strategy.next_backoff(), Some(SECS(1)));
    }

    #[test]
    fn test_ceiling_below_base() {
        let mut strategy = ReconnectStrategy::new(SECS(10), SECS(1), 0);
        assert_eq!(strategy.next_backoff(), Some(SECS(10)));
        assert_eq!(strategy.next_backoff(), Some(SECS(10)));
    }
}
