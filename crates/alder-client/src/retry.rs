//! Retry policies for failed request attempts.
//!
//! The attempt count handed to a policy counts transport submissions: the
//! first submission is attempt 1, so `should_retry(1, ..)` asks whether a
//! second attempt may be made.

use std::fmt;
use std::time::Duration;

use alder_client_api::RaftClientRequest;

/// Decides whether and when a failed attempt is retried.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Whether another attempt may be made after `attempt` submissions.
    fn should_retry(&self, attempt: u32, request: &RaftClientRequest) -> bool;

    /// How long to wait before the next attempt.
    fn sleep_time(&self, attempt: u32, request: &RaftClientRequest) -> Duration;
}

/// Fixed-sleep policy bounded by a total attempt count.
#[derive(Debug, Clone)]
pub struct RetryLimited {
    max_attempts: u32,
    sleep: Duration,
}

impl RetryLimited {
    /// `max_attempts` counts transport submissions and must be at least 1.
    pub fn new(max_attempts: u32, sleep: Duration) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        Self { max_attempts, sleep }
    }
}

impl RetryPolicy for RetryLimited {
    fn should_retry(&self, attempt: u32, _request: &RaftClientRequest) -> bool {
        attempt < self.max_attempts
    }

    fn sleep_time(&self, _attempt: u32, _request: &RaftClientRequest) -> Duration {
        self.sleep
    }
}

/// Exponential backoff bounded by a total attempt count and a sleep cap.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_sleep: Duration,
    max_sleep: Duration,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base_sleep: Duration, max_sleep: Duration, max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        Self {
            base_sleep,
            max_sleep,
            max_attempts,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempt: u32, _request: &RaftClientRequest) -> bool {
        attempt < self.max_attempts
    }

    fn sleep_time(&self, attempt: u32, _request: &RaftClientRequest) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let raw = self.base_sleep.saturating_mul(1u32 << shift);
        raw.min(self.max_sleep)
    }
}

/// Retries forever without sleeping.
///
/// Used when a rejecting server supplies a leader hint: the next attempt is
/// expected to land on the right server, so there is nothing to wait for.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryForeverNoSleep;

impl RetryPolicy for RetryForeverNoSleep {
    fn should_retry(&self, _attempt: u32, _request: &RaftClientRequest) -> bool {
        true
    }

    fn sleep_time(&self, _attempt: u32, _request: &RaftClientRequest) -> Duration {
        Duration::ZERO
    }
}
