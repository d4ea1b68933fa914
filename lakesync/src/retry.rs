//! Bounded retry with exponential backoff and full jitter.
//!
//! Applied at the I/O boundaries that may fail transiently (lake storage reads,
//! staging insert batches). The merge statement is deliberately never routed
//! through this module: a merge must not be re-attempted without re-verifying
//! staging state first.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Bounded retry policy for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the computed backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Calculates the backoff delay for a retry attempt with full jitter.
    ///
    /// Full jitter picks a random delay between zero and
    /// `min(max_delay, initial_delay * 2^attempt)`, which spreads concurrent
    /// retries better than additive jitter at higher attempt counts.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exponential = initial_ms
            .saturating_mul(1u64 << attempt.min(10))
            .min(max_ms);
        let jitter = rand::thread_rng().gen_range(0..=exponential);

        Duration::from_millis(jitter)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `is_transient` decides whether a failure is worth another attempt; permanent
    /// failures and the final attempt's failure are returned as-is.
    pub async fn run<T, F, Fut, P>(
        &self,
        description: &str,
        is_transient: P,
        mut operation: F,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
        P: Fn(&SyncError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < max_attempts - 1 => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "{description} failed transiently, backing off before retry"
                    );
                    sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }

        unreachable!("retry loop always returns from its final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sync_error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_is_bounded_by_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        };

        for attempt in 0..12 {
            assert!(policy.backoff(attempt) <= Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result = policy
            .run(
                "test operation",
                |_| true,
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(sync_error!(ErrorKind::SourceUnavailable, "flaky"))
                        } else {
                            Ok(n)
                        }
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: SyncResult<()> = policy
            .run(
                "test operation",
                |err| err.kind() == ErrorKind::SourceUnavailable,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(sync_error!(ErrorKind::InvalidData, "bad row")) }
                },
            )
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidData);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result: SyncResult<()> = policy
            .run(
                "test operation",
                |_| true,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(sync_error!(ErrorKind::SourceUnavailable, "down")) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
