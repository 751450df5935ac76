//! Circuit breaker for provider rate limiting and IP bans.
//!
//! When the provider returns HTTP 403 (IP ban) or repeated failures, the
//! breaker trips and refuses all requests for a cooldown period (default
//! 30 minutes). Time is read through a `Clock`.

use super::clock::{elapsed_between, Clock, SystemClock};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests are allowed.
    Closed { consecutive_failures: u32 },
    /// Requests are refused until the cooldown expires.
    Open { tripped_at: DateTime<Utc> },
}

/// Refuses requests after a ban or a run of failures.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30 * 60);
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            clock,
            cooldown,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
        }
    }

    /// 30-minute cooldown on the system clock, trips after 3 consecutive failures.
    pub fn default_provider() -> Self {
        Self::new(Self::DEFAULT_COOLDOWN, Arc::new(SystemClock))
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> BreakerState {
        *self.lock()
    }

    /// Check if requests are currently allowed. Closes an expired breaker.
    pub fn is_allowed(&self) -> bool {
        let mut state = self.lock();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { tripped_at } => {
                if elapsed_between(tripped_at, self.clock.now()) >= self.cooldown {
                    tracing::info!("circuit breaker cooldown expired, closing");
                    *state = BreakerState::Closed {
                        consecutive_failures: 0,
                    };
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if let BreakerState::Closed { .. } = *state {
            *state = BreakerState::Closed {
                consecutive_failures: 0,
            };
        }
    }

    /// Count a failure; trips once the threshold is reached.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        if let BreakerState::Closed {
            consecutive_failures,
        } = *state
        {
            let failures = consecutive_failures + 1;
            *state = if failures >= self.failure_threshold {
                tracing::warn!(failures, "circuit breaker tripped");
                BreakerState::Open {
                    tripped_at: self.clock.now(),
                }
            } else {
                BreakerState::Closed {
                    consecutive_failures: failures,
                }
            };
        }
    }

    /// Trip immediately (HTTP 403).
    pub fn trip(&self) {
        tracing::warn!("circuit breaker tripped by provider ban");
        *self.lock() = BreakerState::Open {
            tripped_at: self.clock.now(),
        };
    }

    /// Remaining cooldown (zero when closed).
    pub fn remaining_cooldown(&self) -> Duration {
        match *self.lock() {
            BreakerState::Closed { .. } => Duration::ZERO,
            BreakerState::Open { tripped_at } => self
                .cooldown
                .saturating_sub(elapsed_between(tripped_at, self.clock.now())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::ManualClock;
    use chrono::TimeZone;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
        ));
        (
            CircuitBreaker::new(Duration::from_secs(60), clock.clone()),
            clock,
        )
    }

    #[test]
    fn starts_closed() {
        let (cb, _) = breaker();
        assert!(cb.is_allowed());
        assert_eq!(cb.remaining_cooldown(), Duration::ZERO);
    }

    #[test]
    fn trips_after_threshold_failures() {
        let (cb, _) = breaker();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        cb.record_failure();
        assert!(!cb.is_allowed());
    }

    #[test]
    fn success_resets_counter() {
        let (cb, _) = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_allowed());
    }

    #[test]
    fn expires_after_cooldown() {
        let (cb, clock) = breaker();
        cb.trip();
        assert!(!cb.is_allowed());

        clock.advance(Duration::from_secs(45));
        assert_eq!(cb.remaining_cooldown(), Duration::from_secs(15));
        assert!(!cb.is_allowed());

        clock.advance(Duration::from_secs(15));
        assert!(cb.is_allowed());
        assert_eq!(
            cb.state(),
            BreakerState::Closed {
                consecutive_failures: 0
            }
        );
    }
}
