// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Retry Policy
//!
//! Immutable description of how a call is retried: an attempt budget, a
//! backoff shape, and a classifier deciding which failures are worth another
//! attempt. Policies are plain values built once at wiring time and handed to
//! `crate::infrastructure::retry::execute`.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Backoff arithmetic and retry budgets, free of I/O

use std::fmt;
use std::time::Duration;

/// Wait inserted before attempt `n + 1`, where `n` is the number of failed
/// attempts so far (`n >= 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(n-1)`, optionally capped.
    Exponential { base: Duration, cap: Option<Duration> },
    /// Same wait every time.
    Fixed(Duration),
    /// `step * n`.
    Linear { step: Duration },
}

impl Backoff {
    pub const fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, cap: None }
    }

    pub const fn exponential_capped(base: Duration, cap: Duration) -> Self {
        Backoff::Exponential {
            base,
            cap: Some(cap),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                let delay = base.saturating_mul(factor);
                match cap {
                    Some(cap) => delay.min(cap),
                    None => delay,
                }
            }
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { step } => step.saturating_mul(attempt),
        }
    }
}

/// Retry budget plus classifier for errors of type `E`.
///
/// `max_retries` counts attempts beyond the first, so a policy with
/// `max_retries = 3` runs the operation at most four times.
pub struct RetryPolicy<E> {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub is_retryable: fn(&E) -> bool,
}

impl<E> RetryPolicy<E> {
    pub const fn new(max_retries: u32, backoff: Backoff, is_retryable: fn(&E) -> bool) -> Self {
        Self {
            max_retries,
            backoff,
            is_retryable,
        }
    }

    /// Single attempt, no retries.
    pub const fn never(is_retryable: fn(&E) -> bool) -> Self {
        Self::new(0, Backoff::Fixed(Duration::ZERO), is_retryable)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn should_retry(&self, error: &E) -> bool {
        (self.is_retryable)(error)
    }
}

// Manual impls: `fn(&E) -> bool` is Copy for every E, derive would demand E: Copy.
impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::exponential(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let backoff =
            Backoff::exponential_capped(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(4), Duration::from_secs(8));
        assert_eq!(backoff.delay(5), Duration::from_secs(10));
        assert_eq!(backoff.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_large_attempt_saturates() {
        let backoff = Backoff::exponential(Duration::from_secs(1));
        assert_eq!(backoff.delay(200), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_fixed_and_linear() {
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(200)).delay(7),
            Duration::from_millis(200)
        );
        let linear = Backoff::Linear {
            step: Duration::from_secs(5),
        };
        assert_eq!(linear.delay(1), Duration::from_secs(5));
        assert_eq!(linear.delay(3), Duration::from_secs(15));
    }

    #[test]
    fn test_max_attempts_counts_first_try() {
        let policy: RetryPolicy<String> =
            RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO), |_| true);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(RetryPolicy::<String>::never(|_| true).max_attempts(), 1);
    }
}
