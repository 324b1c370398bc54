//! Retry/give-up state machine for the push task
//!
//! ```text
//! Idle --begin--> Pending --success--> Idle
//!                    |  \--discard--> Idle | BackingOff (unchanged counters)
//!                    \--failure--> BackingOff --begin--> Pending
//!                           \--failed time > give-up--> Abandoned
//! ```
//!
//! Failed time is the sum of the intervals waited before each failed attempt,
//! so the controller is deterministic and testable without a clock. Only an
//! explicit `reset` leaves `Abandoned`.

use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BackoffError {
    #[error("gave up after {failures} failed attempt(s) over {failed_for:?}")]
    GaveUp { failures: u32, failed_for: Duration },
    #[error("a push attempt is already in flight")]
    AttemptInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub ceiling: Duration,
    pub giveup: Duration,
}

impl BackoffPolicy {
    /// A ceiling below `base` is raised to `base`.
    pub fn new(base: Duration, ceiling: Duration, giveup: Duration) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            giveup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Idle,
    Pending,
    BackingOff,
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct BackoffController {
    policy: BackoffPolicy,
    state: PushState,
    failures: u32,
    failed_for: Duration,
    interval: Duration,
}

impl BackoffController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: PushState::Idle,
            failures: 0,
            failed_for: Duration::ZERO,
            interval: policy.base,
        }
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    #[cfg(test)]
    pub fn failed_for(&self) -> Duration {
        self.failed_for
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.interval
    }

    fn gave_up(&self) -> BackoffError {
        BackoffError::GaveUp {
            failures: self.failures,
            failed_for: self.failed_for,
        }
    }

    pub fn begin_attempt(&mut self) -> Result<(), BackoffError> {
        match self.state {
            PushState::Abandoned => Err(self.gave_up()),
            PushState::Pending => Err(BackoffError::AttemptInFlight),
            PushState::Idle | PushState::BackingOff => {
                self.state = PushState::Pending;
                Ok(())
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state == PushState::Abandoned {
            return;
        }
        self.state = PushState::Idle;
        self.failures = 0;
        self.failed_for = Duration::ZERO;
        self.interval = self.policy.base;
    }

    /// Accounts one failed attempt and returns the delay before the next
    /// one, or `GaveUp` once the failed time exceeds the give-up threshold.
    pub fn record_failure(&mut self) -> Result<Duration, BackoffError> {
        if self.state == PushState::Abandoned {
            return Err(self.gave_up());
        }

        self.failures += 1;
        self.failed_for += self.interval;
        self.interval = self.interval.saturating_mul(2).min(self.policy.ceiling);

        if self.failed_for > self.policy.giveup {
            self.state = PushState::Abandoned;
            self.interval = self.policy.base;
            return Err(self.gave_up());
        }

        self.state = PushState::BackingOff;
        Ok(self.interval)
    }

    /// The payload was dropped locally: counters and interval are untouched.
    pub fn record_discard(&mut self) {
        self.settle();
    }

    /// An attempt was cancelled before it produced an outcome.
    pub fn cancel_attempt(&mut self) {
        self.settle();
    }

    fn settle(&mut self) {
        if self.state == PushState::Pending {
            self.state = if self.failures == 0 {
                PushState::Idle
            } else {
                PushState::BackingOff
            };
        }
    }

    /// External restart: back to `Idle` with a clean slate.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }
}
