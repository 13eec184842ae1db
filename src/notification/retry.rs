use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Attempt count plus exponential delay, as a value that can be tested
/// without a network.
///
/// After failed attempt `n` (1-based) the policy waits `base_delay * 2^n`,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    /// Three attempts, sleeping 2s then 4s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, `retryable` rejects the error, or the
    /// attempts run out. Returns the last result and the number of attempts made.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, retryable: R) -> (Result<T, E>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt >= max || !retryable(&e) => return (Err(e), attempt),
                Err(e) => {
                    let wait = self.delay_after(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}...",
                        attempt, max, e, wait
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
