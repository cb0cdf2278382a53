//! Outbound exchange call gate.
//!
//! A single process-global minimum-interval gate serializes all outbound
//! exchange calls. A call that would violate the interval waits
//! cooperatively until eligible, then proceeds; nothing is dropped.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::sync::Arc;
use std::time::Duration;

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct RateGateConfig {
    /// Minimum interval between consecutive exchange calls.
    pub min_interval: Duration,
}

impl Default for RateGateConfig {
    fn default() -> Self {
        Self {
            // 50ms, i.e. at most 20 requests per second
            min_interval: Duration::from_millis(50),
        }
    }
}

/// Shared minimum-interval gate. Cloned handles share the same limiter
/// state, so every exchange-facing component respects one schedule.
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateGate {
    pub fn new(config: RateGateConfig) -> Self {
        let interval = if config.min_interval.is_zero() {
            Duration::from_millis(1)
        } else {
            config.min_interval
        };
        let quota = Quota::with_period(interval).expect("non-zero rate gate interval");
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait until the next call is eligible under the minimum interval.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(RateGateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_call_passes_immediately() {
        let gate = RateGate::default();
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_second_call_is_delayed_by_remaining_interval() {
        let gate = RateGate::new(RateGateConfig {
            min_interval: Duration::from_millis(50),
        });
        gate.acquire().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let start = Instant::now();
        gate.acquire().await;
        // issued 10ms after the first call, so it must wait out the rest
        // of the 50ms window
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[tokio::test]
    async fn test_cloned_gates_share_state() {
        let gate = RateGate::new(RateGateConfig {
            min_interval: Duration::from_millis(50),
        });
        let other = gate.clone();
        gate.acquire().await;

        let start = Instant::now();
        other.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(35));
    }
}
