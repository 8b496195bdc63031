//! Bounded retry with exponential backoff.
//!
//! [`RetryPolicy`] is the immutable description; [`RetryBudget`] is the
//! per-operation state that hands out delays until the budget is spent.
//! Neither sleeps on its own, so both can be exercised without a runtime.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
    /// Fraction of each delay randomized away, in `[0, 1]`.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Retry immediately, at most `max_retries` times.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: 0.0,
        }
    }

    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(*self)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

/// Exponential backoff: each delay doubles, capped at `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.checked_mul(2).unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Retry state for one logical operation.
#[derive(Clone, Debug)]
pub struct RetryBudget {
    policy: RetryPolicy,
    backoff: Backoff,
    retries: u32,
}

impl RetryBudget {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            backoff: Backoff::new(policy.base, policy.max),
            policy,
            retries: 0,
        }
    }

    /// Claim one retry. Returns the delay to wait first, or `None` once the
    /// budget is spent.
    pub fn next_retry(&mut self) -> Option<Duration> {
        self.next_retry_with(&mut rand::thread_rng())
    }

    /// [`Self::next_retry`] with a caller-supplied source of jitter.
    pub fn next_retry_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;
        let delay = self.backoff.next_delay();
        if self.policy.jitter <= 0.0 || delay.is_zero() {
            return Some(delay);
        }
        let keep = 1.0 - self.policy.jitter * rng.gen::<f64>();
        Some(delay.mul_f64(keep))
    }

    /// Restart the delay sequence from the base delay without giving back
    /// any retries. Called once a transient failure has cleared.
    pub fn recovered(&mut self) {
        self.backoff.reset();
    }

    /// Retries claimed so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Attempts made so far, counting the first.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.retries >= self.policy.max_retries
    }
}
