//! Retry planning after failed cycles.

use crate::config::RetryConfig;
use crate::error::SyncError;
use std::time::Duration;

/// What to do after a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry once after the delay.
    Schedule(Duration),
    /// Too many automatic retries in a row; surface the banner.
    Exhausted,
    /// The credential was rejected; wait for a new one.
    Blocked,
    /// Retrying would not help.
    GiveUp,
}

/// Tracks consecutive failures and the single pending retry slot.
#[derive(Debug, Clone)]
pub struct RetryPlanner {
    config: RetryConfig,
    consecutive: u32,
    pending: Option<Duration>,
}

impl RetryPlanner {
    /// Creates a planner.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            consecutive: 0,
            pending: None,
        }
    }

    /// Records a failed cycle and decides on a retry. A manual failure
    /// starts a fresh retry budget.
    pub fn on_failure(&mut self, error: &SyncError, manual: bool) -> RetryDecision {
        if manual {
            self.consecutive = 0;
        }
        self.pending = None;

        if error.is_fatal() {
            return if error.is_auth() {
                RetryDecision::Blocked
            } else {
                RetryDecision::GiveUp
            };
        }
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if self.consecutive >= self.config.max_consecutive_retries {
            return RetryDecision::Exhausted;
        }

        self.consecutive += 1;
        self.pending = Some(self.config.delay);
        RetryDecision::Schedule(self.config.delay)
    }

    /// Records a successful cycle; cancels any pending retry.
    pub fn on_success(&mut self) {
        self.consecutive = 0;
        self.pending = None;
    }

    /// Takes the pending retry delay, if one was scheduled since the last
    /// call.
    pub fn take_pending(&mut self) -> Option<Duration> {
        self.pending.take()
    }

    /// Automatic retries in a row so far.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> SyncError {
        SyncError::Network("down".into())
    }

    #[test]
    fn retries_until_exhausted() {
        let mut planner = RetryPlanner::new(RetryConfig::new(Duration::from_secs(10), 2));
        assert_eq!(
            planner.on_failure(&network(), false),
            RetryDecision::Schedule(Duration::from_secs(10))
        );
        assert_eq!(planner.take_pending(), Some(Duration::from_secs(10)));
        assert_eq!(planner.take_pending(), None);
        assert!(matches!(planner.on_failure(&network(), false), RetryDecision::Schedule(_)));
        assert_eq!(planner.on_failure(&network(), false), RetryDecision::Exhausted);
        assert_eq!(planner.take_pending(), None);

        assert!(matches!(planner.on_failure(&network(), true), RetryDecision::Schedule(_)));
        assert_eq!(planner.consecutive(), 1);
    }

    #[test]
    fn success_cancels_pending() {
        let mut planner = RetryPlanner::new(RetryConfig::default());
        planner.on_failure(&network(), false);
        planner.on_success();
        assert_eq!(planner.take_pending(), None);
        assert_eq!(planner.consecutive(), 0);
    }

    #[test]
    fn fatal_errors_never_retry() {
        let mut planner = RetryPlanner::new(RetryConfig::default());
        assert_eq!(
            planner.on_failure(&SyncError::Auth("bad".into()), false),
            RetryDecision::Blocked
        );
        assert_eq!(
            planner.on_failure(&SyncError::Permission("no".into()), true),
            RetryDecision::Blocked
        );
        assert_eq!(
            planner.on_failure(
                &SyncError::LocalTransaction(bikeledger_store::StoreError::aborted("disk")),
                true
            ),
            RetryDecision::GiveUp
        );
        assert_eq!(
            planner.on_failure(&SyncError::NotConfigured, true),
            RetryDecision::GiveUp
        );
        assert_eq!(planner.take_pending(), None);
    }
}
