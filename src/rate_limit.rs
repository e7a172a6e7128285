//! Admission gate for outbound search requests.
//!
//! One `TokenBucket` is shared by every request the process makes. The
//! bookkeeping is a `governor` GCRA limiter driven by `TokioClock`, so time is
//! read through `tokio::time` and tests can drive it with a paused clock.

use crate::config::CrawlConfig;
use governor::{
    clock::{Clock, Reference},
    middleware::NoOpMiddleware,
    nanos::Nanos,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::ops::Add;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("rate must be a positive, finite number of permits per second (got {0})")]
    InvalidRate(f64),

    #[error("burst capacity must be at least 1")]
    InvalidBurst,

    #[error("cancelled while waiting for a rate limit permit")]
    Cancelled,
}

/// A point on `TokioClock`, stored as the offset from the clock's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokioInstant(Nanos);

impl Add<Nanos> for TokioInstant {
    type Output = TokioInstant;

    fn add(self, other: Nanos) -> TokioInstant {
        TokioInstant(self.0 + other)
    }
}

impl Reference for TokioInstant {
    fn duration_since(&self, earlier: Self) -> Nanos {
        Nanos::from(Duration::from(self.0).saturating_sub(Duration::from(earlier.0)))
    }

    fn saturating_sub(&self, duration: Nanos) -> Self {
        TokioInstant(Nanos::from(
            Duration::from(self.0).saturating_sub(Duration::from(duration)),
        ))
    }
}

/// A `governor` clock that follows `tokio::time`, including its paused test
/// clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = TokioInstant;

    fn now(&self) -> TokioInstant {
        TokioInstant(Nanos::from(Instant::now().saturating_duration_since(self.origin)))
    }
}

type DirectLimiter =
    RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<TokioInstant>>;

pub struct TokenBucket {
    limiter: DirectLimiter,
    clock: TokioClock,
    /// Time between two permits at the steady-state rate.
    interval: Duration,
}

impl TokenBucket {
    /// Creates a bucket that refills at `rate_per_second` and holds at most
    /// `burst` permits. The bucket starts full.
    pub fn new(rate_per_second: f64, burst: u32) -> Result<Self, RateLimitError> {
        if !rate_per_second.is_finite() || rate_per_second <= 0.0 {
            return Err(RateLimitError::InvalidRate(rate_per_second));
        }
        let burst = NonZeroU32::new(burst).ok_or(RateLimitError::InvalidBurst)?;

        let interval = Duration::try_from_secs_f64(1.0 / rate_per_second)
            .map_err(|_| RateLimitError::InvalidRate(rate_per_second))?;
        let quota = Quota::with_period(interval)
            .ok_or(RateLimitError::InvalidRate(rate_per_second))?
            .allow_burst(burst);

        let clock = TokioClock::default();
        Ok(Self {
            limiter: RateLimiter::direct_with_clock(quota, &clock),
            clock,
            interval,
        })
    }

    pub fn from_config(config: &CrawlConfig) -> Result<Self, RateLimitError> {
        Self::new(config.rate_per_second, config.burst)
    }

    /// The steady-state spacing between permits.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a permit is available and consumes it.
    ///
    /// Fails with `RateLimitError::Cancelled` if `cancel` is (or becomes)
    /// `true` before the permit is granted. No permit is consumed in that
    /// case.
    pub async fn acquire(&self, cancel: &mut watch::Receiver<bool>) -> Result<(), RateLimitError> {
        if *cancel.borrow() {
            return Err(RateLimitError::Cancelled);
        }

        loop {
            let wait = match self.limiter.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => not_until.wait_time_from(self.clock.now()),
            };
            trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit permit");

            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    match changed {
                        Ok(()) if *cancel.borrow() => return Err(RateLimitError::Cancelled),
                        Ok(()) => continue,
                        // The sender is gone, so cancellation can no longer arrive.
                        Err(_) => sleep(wait).await,
                    }
                }
                _ = sleep(wait) => {}
            }
        }
    }
}
