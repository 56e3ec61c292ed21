//! Per-step retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled for every further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that tries once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait after the failed `attempt` (1-indexed) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// Returns the last error. `label` names the step in logs.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Backoff after the failed `attempt` (1-indexed): `base * 2^(attempt - 1)`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(1, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(8));
    }

    #[test]
    fn backoff_before_first_attempt_is_zero() {
        assert_eq!(backoff_delay(0, Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn backoff_saturates() {
        let delay = backoff_delay(64, Duration::from_secs(2));
        assert!(delay >= Duration::from_secs(1 << 31));
    }

    #[tokio::test(start_paused = true)]
    async fn run_waits_only_between_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), String> = policy
            .run("unit", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s + 4s; no wait after the last attempt.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_at_first_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let result: Result<u32, String> = policy
            .run("unit", |attempt| async move {
                if attempt < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }
}
