use ironmaker_core::{CircuitBreakerConfig, ExchangeError};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    total_blocked: u64,
    total_failures: u64,
    total_successes: u64,
}

/// Shared circuit breaker guarding every REST call.
///
/// Only transport-class failures are recorded; business rejections prove
/// the exchange is reachable and count as successes here. In half-open,
/// exactly one probe request may be in flight at a time.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

/// Point-in-time view exposed by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failures: u32,
    pub failure_threshold: u32,
    pub total_blocked: u64,
    pub total_failures: u64,
    pub total_successes: u64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs_f64(config.recovery_timeout.max(0.0)),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
                probe_in_flight: false,
                total_blocked: 0,
                total_failures: 0,
                total_successes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transitions OPEN to HALF_OPEN once the recovery timeout has elapsed.
    fn check_recovery(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            let elapsed = inner.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
            if elapsed >= self.recovery_timeout {
                tracing::info!("circuit breaker OPEN -> HALF_OPEN, probing recovery");
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }
    }

    /// Asks permission to issue one request.
    ///
    /// # Errors
    /// Returns `ExchangeError::CircuitOpen` when the circuit is open, or
    /// when a half-open probe is already in flight.
    pub fn try_acquire(&self) -> Result<(), ExchangeError> {
        let mut inner = self.lock();
        self.check_recovery(&mut inner);

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                inner.total_blocked += 1;
                let elapsed = inner.opened_at.map_or(Duration::ZERO, |t| t.elapsed());
                let retry_in = self.recovery_timeout.saturating_sub(elapsed);
                Err(ExchangeError::CircuitOpen { retry_in })
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.total_blocked += 1;
                    Err(ExchangeError::CircuitOpen {
                        retry_in: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;

        match inner.state {
            BreakerState::HalfOpen => {
                tracing::info!("circuit breaker HALF_OPEN -> CLOSED, recovered");
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            BreakerState::Closed => {
                inner.failures = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.total_failures += 1;

        match inner.state {
            BreakerState::HalfOpen => {
                tracing::warn!("circuit breaker HALF_OPEN -> OPEN, probe failed");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            BreakerState::Closed => {
                if inner.failures >= self.failure_threshold {
                    tracing::warn!(
                        failures = inner.failures,
                        "circuit breaker CLOSED -> OPEN"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.check_recovery(&mut inner);
        inner.state
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.check_recovery(&mut inner);
        BreakerSnapshot {
            state: inner.state,
            failures: inner.failures,
            failure_threshold: self.failure_threshold,
            total_blocked: inner.total_blocked,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_seconds: f64) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery_seconds,
        })
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let b = breaker(3, 30.0);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(matches!(
            b.try_acquire(),
            Err(ExchangeError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn success_resets_the_failure_count() {
        let b = breaker(3, 30.0);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let b = breaker(1, 0.0);
        b.record_failure();
        // zero recovery timeout moves straight to half-open on next check
        assert!(b.try_acquire().is_ok());
        assert!(b.try_acquire().is_err());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let b = breaker(1, 0.0);
        b.record_failure();
        assert!(b.try_acquire().is_ok());
        b.record_failure();
        // opened_at was just refreshed but timeout is zero, so the next
        // acquire probes again rather than staying latched open
        assert!(b.try_acquire().is_ok());
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn recovery_waits_for_the_timeout() {
        let b = breaker(1, 60.0);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        match b.try_acquire() {
            Err(ExchangeError::CircuitOpen { retry_in }) => {
                assert!(retry_in <= Duration::from_secs(60));
                assert!(retry_in > Duration::from_secs(50));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }
}
