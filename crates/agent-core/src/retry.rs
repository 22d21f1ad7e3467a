//! Retry Policies
//!
//! One retry utility shared by the model-call layer (fixed back-off on
//! transient network errors) and tool invocation (exponential back-off on
//! any error).

use std::future::Future;
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Delay between attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed(Duration),
    /// `base * 2^attempt` after failed attempt number `attempt` (0-based)
    Exponential { base: Duration },
}

/// How many times to try and how long to wait in between
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Model calls: 5 attempts, 1 second apart
    pub const fn model_default() -> Self {
        Self::new(5, Backoff::Fixed(Duration::from_secs(1)))
    }

    /// Tool calls: 5 attempts, waiting 1, 2, 4, 8 seconds
    pub const fn tool_default() -> Self {
        Self::new(
            5,
            Backoff::Exponential {
                base: Duration::from_secs(1),
            },
        )
    }

    /// Single attempt
    pub const fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Delay after failed attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base } => base.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }

    /// Run `op` until it succeeds, the error is not retryable, or attempts
    /// run out. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        should_retry: impl Fn(&AgentError) -> bool,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < attempts && should_retry(&err) => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        target: "agent_core::retry",
                        %label,
                        attempt = attempt + 1,
                        ?delay,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::tool_default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_backoff_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<()> = RetryPolicy::model_default()
            .run("model", AgentError::is_transient, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::Connection("refused".into())) }
            })
            .await;

        assert!(matches!(result, Err(AgentError::Connection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed().as_secs(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::model_default()
            .run("model", AgentError::is_transient, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentError::Provider("400".into())) }
            })
            .await;

        assert!(matches!(result, Err(AgentError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let value = RetryPolicy::tool_default()
            .run("tool", |_| true, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 4 {
                        Err(AgentError::ToolExecution("flaky".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 4);
        assert_eq!(start.elapsed().as_secs(), 1 + 2 + 4 + 8);
    }
}
