use std::time::Duration;

use crate::error::FailureKind;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop: the task fails terminally.
    GiveUp,
    /// Re-queue; eligible again after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with a cap and an attempt ceiling.
///
/// Built from `[retry]` in the config (see `XferConfig::retry_policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the given (1-based) attempt failed:
    /// `min(base * 2^(attempt-1), max_delay)`. Attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let raw = self.base_delay.saturating_mul(1u32 << exp);
        raw.min(self.max_delay)
    }

    /// Decide what happens after `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        match kind {
            FailureKind::Permanent => RetryDecision::GiveUp,
            FailureKind::Transient => RetryDecision::RetryAfter(self.delay(attempt)),
            // The outage itself was the wait; the attempt still counts.
            FailureKind::NetworkLost => RetryDecision::RetryAfter(Duration::ZERO),
        }
    }

    /// Delays a task that fails every attempt will wait, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay(a)).collect()
    }
}
