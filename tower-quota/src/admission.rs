use std::fmt;
use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use quota_limit::CallOutcome;
use quota_limit::DailyQuota;
use quota_limit::DayClock;
use quota_limit::LocalDayClock;
use quota_limit::RetryPolicy;
use quota_limit::RetryingInvoker;
use quota_limit::SlidingWindowLimiter;
use quota_limit::UpstreamError;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;
use tracing::debug;
use tracing::instrument;

use crate::GatewayError;

/// Returned instead of content once the daily quota is spent.
pub const DAILY_LIMIT_EXCEEDED: &str = "Day limit exceeded";

/// Returned instead of content once transient upstream failures exhaust the
/// retry budget.
pub const TRY_AGAIN_LATER: &str = "Please try again...";

/// What a caller receives from [`Admission::perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    /// The upstream answered.
    Content(T),
    /// The daily quota is spent; the upstream was not contacted.
    DailyLimitExceeded,
    /// Every attempt failed transiently.
    TryAgainLater,
}

impl<T> Reply<T> {
    pub fn content(self) -> Option<T> {
        match self {
            Self::Content(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(value) => value.fmt(f),
            Self::DailyLimitExceeded => f.write_str(DAILY_LIMIT_EXCEEDED),
            Self::TryAgainLater => f.write_str(TRY_AGAIN_LATER),
        }
    }
}

#[cfg(feature = "axum")]
impl<T: axum::response::IntoResponse> axum::response::IntoResponse for Reply<T> {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Content(value) => value.into_response(),
            Self::DailyLimitExceeded => DAILY_LIMIT_EXCEEDED.into_response(),
            Self::TryAgainLater => TRY_AGAIN_LATER.into_response(),
        }
    }
}

#[derive(Clone, Debug)]
struct AdmissionMetrics {
    attempts: Counter<u64>,
    failures: Counter<u64>,
    outcomes: Counter<u64>,
}

/// The shared admission state for one upstream.
///
/// Cloning is cheap and every clone shares the same daily quota and sliding
/// window, so one `Admission` built at start-up can be handed to every request
/// handler.
pub struct Admission<C = LocalDayClock> {
    quota: Arc<DailyQuota<C>>,
    limiter: Arc<SlidingWindowLimiter>,
    invoker: RetryingInvoker,
    instruments: AdmissionMetrics,
}

// Manually implement Clone so the clock does not need to be Clone
impl<C> Clone for Admission<C> {
    fn clone(&self) -> Self {
        Self {
            quota: Arc::clone(&self.quota),
            limiter: Arc::clone(&self.limiter),
            invoker: self.invoker,
            instruments: self.instruments.clone(),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for Admission<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("quota", &self.quota)
            .field("limiter", &self.limiter)
            .field("invoker", &self.invoker)
            .finish()
    }
}

impl<C: DayClock> Admission<C> {
    pub fn new(
        quota: Arc<DailyQuota<C>>,
        limiter: Arc<SlidingWindowLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        let meter = global::meter("admission");
        let instruments = AdmissionMetrics {
            attempts: meter.u64_counter("upstream_attempts").build(),
            failures: meter.u64_counter("upstream_failures").build(),
            outcomes: meter.u64_counter("admission_outcomes").build(),
        };

        Self {
            quota,
            limiter,
            invoker: RetryingInvoker::new(policy),
            instruments,
        }
    }

    pub fn quota(&self) -> &DailyQuota<C> {
        &self.quota
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.invoker.policy()
    }

    /// Perform one rate limited, retried call through `port`.
    ///
    /// The daily quota is checked first; when it is spent neither the window
    /// nor the port is touched. Each attempt then waits for a window slot,
    /// builds a fresh request and calls `port`.
    ///
    /// Port errors that downcast to [`UpstreamError`] are classified as such;
    /// any other error counts as [`UpstreamError::Transient`].
    #[instrument(name = "admission_perform", skip_all)]
    pub async fn perform<S, Req, B>(
        &self,
        build_request: B,
        port: S,
    ) -> Result<Reply<S::Response>, GatewayError>
    where
        S: Service<Req, Error = BoxError> + Clone,
        B: Fn() -> Req,
    {
        if !self.quota.allow_request() {
            self.record("daily_limit_exceeded");
            return Ok(Reply::DailyLimitExceeded);
        }

        let limiter = &self.limiter;
        let build_request = &build_request;
        let AdmissionMetrics {
            attempts, failures, ..
        } = &self.instruments;

        let outcome = self
            .invoker
            .execute(move |attempt| {
                let port = port.clone();
                async move {
                    limiter.acquire().await;
                    debug!(attempt, "window slot acquired");
                    attempts.add(1, &[]);

                    let request = build_request();
                    port.oneshot(request).await.map_err(|err| {
                        let err = classify(err);
                        let class = if err.is_rate_limited() {
                            "rate_limited"
                        } else {
                            "transient"
                        };
                        failures.add(1, &[KeyValue::new("class", class)]);
                        err
                    })
                }
            })
            .await;

        match outcome {
            CallOutcome::Success(content) => {
                self.record("success");
                Ok(Reply::Content(content))
            }
            CallOutcome::Exhausted { .. } => {
                self.record("try_again_later");
                Ok(Reply::TryAgainLater)
            }
            CallOutcome::RateLimited { attempts } => {
                self.record("upstream_rate_limited");
                Err(GatewayError::UpstreamRateLimited { attempts })
            }
        }
    }

    fn record(&self, outcome: &'static str) {
        self.instruments
            .outcomes
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Map a port error onto the retry classification.
pub(crate) fn classify(err: BoxError) -> UpstreamError {
    match err.downcast::<UpstreamError>() {
        Ok(upstream) => *upstream,
        Err(other) => UpstreamError::transient(other),
    }
}
