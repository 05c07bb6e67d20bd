//! Fixed-delay retry policy.
//!
//! A policy is a maximum attempt count plus a delay between attempts. What
//! counts as retryable is supplied per operation, and sleeping goes through a
//! [`Sleeper`] so tests can run without real delays.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Source of delays between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; never below 1
    pub max_attempts: u32,
    /// Delay before every retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// Final value of a retried operation and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
    /// True when the last value was still retryable but the budget ran out
    pub exhausted: bool,
}

impl RetryPolicy {
    /// `retries` extra attempts after the first, `delay` apart.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 1,
        }
    }

    /// Run `op` until `retryable` rejects its value or the budget is spent.
    ///
    /// The last value is always returned; exhausting the budget never turns a
    /// retryable value into a success.
    pub async fn run<T, F, Fut, P>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: F,
        retryable: P,
    ) -> Retried<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        P: Fn(&T) -> bool,
    {
        let mut state = self.start();
        loop {
            let value = op(state.attempt()).await;
            if !retryable(&value) {
                return Retried {
                    value,
                    attempts: state.attempt(),
                    exhausted: false,
                };
            }
            if !state.next(sleeper).await {
                return Retried {
                    value,
                    attempts: state.attempt(),
                    exhausted: true,
                };
            }
        }
    }
}

/// Attempt counter for loops that cannot be expressed as a closure, such as
/// an operation that needs `&mut` access to a buffer on every attempt.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Current attempt number (1-based)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn remaining(&self) -> u32 {
        self.policy.max_attempts.max(1).saturating_sub(self.attempt)
    }

    /// Record a retryable failure. Sleeps and returns true if another attempt
    /// is allowed, returns false without sleeping once the budget is spent.
    pub async fn next(&mut self, sleeper: &dyn Sleeper) -> bool {
        if self.remaining() == 0 {
            return false;
        }
        sleeper.sleep(self.policy.delay_for(self.attempt)).await;
        self.attempt += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::RecordingSleeper;

    #[tokio::test]
    async fn test_success_first_attempt() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));

        let result = policy
            .run(&sleeper, |_| async { Ok::<u32, &str>(7) }, |r| r.is_err())
            .await;

        assert_eq!(result.value, Ok(7));
        assert_eq!(result.attempts, 1);
        assert!(!result.exhausted);
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_below_budget() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));

        // Fails on attempts 1..=3, succeeds on 4
        let result = policy
            .run(
                &sleeper,
                |attempt| async move {
                    if attempt <= 3 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                },
                |r| r.is_err(),
            )
            .await;

        assert_eq!(result.value, Ok(4));
        assert_eq!(result.attempts, 4);
        assert!(!result.exhausted);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(5); 3]
        );
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_value() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(2, Duration::from_millis(10));

        let result = policy
            .run(
                &sleeper,
                |attempt| async move { Err::<(), u32>(attempt) },
                |r| r.is_err(),
            )
            .await;

        assert_eq!(result.value, Err(3));
        assert_eq!(result.attempts, 3);
        assert!(result.exhausted);
        // No sleep after the final attempt
        assert_eq!(sleeper.count(), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_never_sleeps() {
        let sleeper = RecordingSleeper::default();
        let result = RetryPolicy::fixed(0, Duration::from_secs(5))
            .run(&sleeper, |_| async { Err::<(), ()>(()) }, |r| r.is_err())
            .await;
        assert_eq!(result.attempts, 1);
        assert!(result.exhausted);
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn test_retry_state_counts_down() {
        let sleeper = RecordingSleeper::default();
        let mut state = RetryPolicy::fixed(1, Duration::from_secs(1)).start();

        assert_eq!(state.attempt(), 1);
        assert_eq!(state.remaining(), 1);
        assert!(state.next(&sleeper).await);
        assert_eq!(state.attempt(), 2);
        assert!(!state.next(&sleeper).await);
        assert_eq!(sleeper.count(), 1);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }
}
