use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use ironmaker_core::RateLimitConfig;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

type DirectLimiter = RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

/// Shared request limiter for all REST traffic. Callers await `acquire`
/// before every request; the limiter back-pressures instead of rejecting,
/// so bursts from many market workers smear out over the window.
pub struct RequestLimiter {
    limiter: DirectLimiter,
    max_requests: u32,
    window_seconds: f64,
    admitted: AtomicU64,
    throttled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LimiterStats {
    pub admitted: u64,
    pub throttled: u64,
    pub max_requests: u32,
    pub window_seconds: f64,
}

impl RequestLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        // config.validate() guarantees max_requests >= 1 and a positive window
        let max = NonZeroU32::new(config.max_requests.max(1)).unwrap();
        let replenish =
            Duration::from_secs_f64((config.window_seconds / f64::from(max.get())).max(1e-6));
        let quota = Quota::with_period(replenish).unwrap().allow_burst(max);

        Self {
            limiter: RateLimiter::direct(quota),
            max_requests: config.max_requests,
            window_seconds: config.window_seconds,
            admitted: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        }
    }

    /// Waits until the request fits within the configured window.
    pub async fn acquire(&self) {
        if self.limiter.check().is_err() {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            let started = Instant::now();
            self.limiter.until_ready().await;
            tracing::debug!(
                waited_ms = started.elapsed().as_millis() as u64,
                "rate limit back-pressure"
            );
        }
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-blocking admission check for traffic that must not queue,
    /// such as health probes.
    pub fn try_acquire(&self) -> bool {
        let admitted = self.limiter.check().is_ok();
        if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    #[must_use]
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            max_requests: self.max_requests,
            window_seconds: self.window_seconds,
        }
    }
}
