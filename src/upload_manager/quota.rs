//! Quota suspension state machine.
//!
//! When the remote API signals rate-limit exhaustion the worker is suspended
//! for a flat, configured duration. Quota windows reset on a schedule, so the
//! pause is deliberately not exponential. The consecutive-failure count is
//! kept for observability but does not lengthen future suspensions.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

/// Current state of the quota policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaState {
    /// Uploads may proceed.
    Active,
    /// Uploads are paused until the deadline.
    Suspended { until: Instant },
}

/// Flat-backoff suspension policy driven by the upload worker.
#[derive(Debug)]
pub struct QuotaPolicy {
    suspension: Duration,
    state: QuotaState,
    consecutive_failures: u32,
}

impl QuotaPolicy {
    pub fn new(suspension: Duration) -> Self {
        Self {
            suspension,
            state: QuotaState::Active,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> QuotaState {
        self.state
    }

    /// Consecutive quota failures since the last successful upload.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a quota failure: transition to `Suspended` and return the
    /// wake deadline.
    pub fn suspend(&mut self) -> Instant {
        let until = Instant::now() + self.suspension;
        self.consecutive_failures += 1;
        self.state = QuotaState::Suspended { until };
        info!(
            "Quota suspension until {:?} (consecutive failures: {})",
            until, self.consecutive_failures
        );
        until
    }

    /// Transition back to `Active` after the suspension elapses. The
    /// failure count is preserved (flat policy, counted for observability).
    pub fn resume(&mut self) {
        self.state = QuotaState::Active;
    }

    /// Record a successful upload: reset the failure count.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = QuotaState::Active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_suspend_sets_flat_deadline() {
        let mut policy = QuotaPolicy::new(Duration::from_secs(7200));
        assert_eq!(policy.state(), QuotaState::Active);

        let before = Instant::now();
        let until = policy.suspend();
        assert_eq!(until, before + Duration::from_secs(7200));
        assert_eq!(policy.state(), QuotaState::Suspended { until });
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_suspensions_stay_flat() {
        // Flat policy: the second suspension is the same length as the first.
        let mut policy = QuotaPolicy::new(Duration::from_secs(100));

        let first = policy.suspend();
        assert_eq!(first, Instant::now() + Duration::from_secs(100));
        policy.resume();

        tokio::time::advance(Duration::from_secs(100)).await;

        let second = policy.suspend();
        assert_eq!(second, Instant::now() + Duration::from_secs(100));
        assert_eq!(policy.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_preserves_failure_count() {
        let mut policy = QuotaPolicy::new(Duration::from_secs(10));
        policy.suspend();
        policy.resume();
        assert_eq!(policy.state(), QuotaState::Active);
        assert_eq!(policy.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let mut policy = QuotaPolicy::new(Duration::from_secs(10));
        policy.suspend();
        policy.resume();
        policy.record_success();
        assert_eq!(policy.consecutive_failures(), 0);
        assert_eq!(policy.state(), QuotaState::Active);
    }
}
