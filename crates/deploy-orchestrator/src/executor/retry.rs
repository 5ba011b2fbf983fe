//! Bounded exponential backoff with jitter.

use crate::network::NetworkError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` attempts with no sleeping in between. For tests.
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure is `attempt = 1`).
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`. With jitter the result is
    /// drawn uniformly from `[delay/2, delay]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let spread = (delay - half).as_millis() as u64;
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// The last failure of an exhausted or non-retryable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    pub attempts: u32,
    pub last: NetworkError,
}

/// Runs `f` until it succeeds, fails with a non-transient error, or the policy is exhausted.
///
/// `f` receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    component: &str,
    mut f: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, NetworkError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(component, operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    component,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryError {
                    attempts: attempt,
                    last: error,
                });
            }
        }
    }
}
