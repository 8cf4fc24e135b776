use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use crate::UpstreamError;

/// Bounded retry parameters with a distinct fixed delay per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    base_delay: Duration,
    rate_limit_delay: Duration,
}

const DEFAULT_ATTEMPTS: NonZeroU32 = NonZeroU32::new(3).unwrap();

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates a new `RetryPolicy`.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Total attempts, including the first one.
    /// * `base_delay` - Pause before retrying after a transient failure.
    /// * `rate_limit_delay` - Pause before retrying after the upstream rate limited us.
    pub fn new(max_attempts: NonZeroU32, base_delay: Duration, rate_limit_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            rate_limit_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    /// The pause before the next attempt after `err`.
    pub fn delay_for(&self, err: &UpstreamError) -> Duration {
        match err {
            UpstreamError::RateLimited => self.rate_limit_delay,
            UpstreamError::Transient(_) => self.base_delay,
        }
    }
}

/// The final result of driving an operation through a [`RetryingInvoker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// An attempt succeeded.
    Success(T),

    /// The final attempt was rate limited by the upstream.
    ///
    /// This is surfaced to the caller as a failure.
    RateLimited { attempts: u32 },

    /// The final attempt failed transiently.
    ///
    /// Callers degrade this to a fixed fallback rather than exposing
    /// `last_error`.
    Exhausted {
        attempts: u32,
        last_error: UpstreamError,
    },
}

/// Drives an operation for up to `max_attempts` attempts.
///
/// * Success returns immediately, with no delay.
/// * [`UpstreamError::RateLimited`] waits the rate-limit delay and retries; on
///   the final attempt it becomes [`CallOutcome::RateLimited`].
/// * [`UpstreamError::Transient`] waits the base delay and retries; on the
///   final attempt it becomes [`CallOutcome::Exhausted`].
///
/// Delays are fixed, there is no jitter or exponential growth.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryingInvoker {
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> CallOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            let err = match operation(attempt).await {
                Ok(value) => {
                    debug!(attempt, "upstream call succeeded");
                    return CallOutcome::Success(value);
                }
                Err(err) => err,
            };

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %err, "retry budget exhausted");
                return match err {
                    UpstreamError::RateLimited => CallOutcome::RateLimited { attempts: attempt },
                    last_error => CallOutcome::Exhausted {
                        attempts: attempt,
                        last_error,
                    },
                };
            }

            let delay = self.policy.delay_for(&err);
            warn!(attempt, ?delay, error = %err, "upstream call failed, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }
}
