//! Retry policy with exponential backoff and jitter.
//!
//! Used for exchange client bring-up at startup; reusable for any
//! fallible async exchange call. Order placement deliberately does not
//! retry (a repeated market order is not idempotent).

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0..=1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (0-based), capped at
    /// `max_delay`, without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(20);
        let delay = self.initial_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = base.as_secs_f64() * self.jitter * rand::thread_rng().gen::<f64>();
        base + Duration::from_secs_f64(spread)
    }

    /// Run `operation` until it succeeds or attempts are exhausted,
    /// sleeping the jittered backoff between failures. The last error is
    /// returned when every attempt fails.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.jittered_delay(attempt - 1);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        label, attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
