//! Retry bookkeeping: state machine states and backoff computation.

use std::fmt;
use std::time::Duration;

use uplink_protocol::RetryOptions;

use crate::types::KeepaliveConfig;

/// Where a loader stands with respect to retrying.
///
/// `NotAttemptingRetry -> RetryScheduled -> RetryInProgress`, and from there
/// back to `NotAttemptingRetry` or `RetryScheduled` again. A scheduled retry
/// whose initiator is gone parks in `WaitingForSameIsolationKeyDocument`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryState {
    #[default]
    NotAttemptingRetry,
    RetryScheduled,
    WaitingForSameIsolationKeyDocument,
    RetryInProgress,
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetryState::NotAttemptingRetry => "not attempting retry",
            RetryState::RetryScheduled => "retry scheduled",
            RetryState::WaitingForSameIsolationKeyDocument => {
                "waiting for same isolation key document"
            }
            RetryState::RetryInProgress => "retry in progress",
        };
        f.write_str(s)
    }
}

/// Effective retry limits for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_age: Duration,
}

impl RetryPolicy {
    /// Clamps a request's options by the service ceilings.
    pub fn effective(options: &RetryOptions, config: &KeepaliveConfig) -> Self {
        Self {
            max_attempts: options.max_attempts.min(config.max_attempts),
            initial_delay: options.initial_delay.min(config.initial_delay),
            backoff_factor: options.backoff_factor.min(config.backoff_factor).max(1.0),
            max_age: options.max_age.min(config.max_age),
        }
    }

    /// Delay before retry number `attempt` (1-based):
    /// `initial_delay * backoff_factor^(attempt - 1)`, capped at `max_age`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_age.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_age)
    }
}
