//! # Tower Quota
//!
//! `tower-quota` guards a metered upstream API (such as a hosted chat-completion
//! service) behind the admission primitives of [`quota_limit`], packaged for
//! the [Tower](https://github.com/tower-rs/tower) ecosystem.
//!
//! ## The Admission Stack
//! [`Admission::perform`] is the single public operation. For every call it:
//!
//! 1. **Daily Quota**: checks the per-day budget first. When it is spent the
//!    caller gets [`Reply::DailyLimitExceeded`] and nothing else is touched.
//! 2. **Sliding Window**: each attempt waits for a slot in the shared window
//!    before the upstream is contacted.
//! 3. **Retry**: upstream "too many requests" and transient failures are
//!    retried with their own fixed delays. Exhausted transient failures degrade
//!    to [`Reply::TryAgainLater`]; an exhausted rate limit is surfaced as
//!    [`GatewayError::UpstreamRateLimited`].
//!
//! [`AdmissionLayer`] runs the same operation for every request of a wrapped
//! service (the upstream port), and [`CallerLimitLayer`] adds an independent
//! per-caller window in front of it.
//!
//! Cancellation and deadlines are not handled here; wrap the stack in
//! `tower::timeout` if callers need one.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`GatewayError`] and [`Reply`], and
//!   [`CallerIdentity`] for `http::Request` (429, 401, 200).
//! - `cli`: Builds the `stress_test` load driver.

mod admission;
mod caller;
mod config;
mod error;
mod layer;
mod service;


pub use admission::Admission;
pub use admission::DAILY_LIMIT_EXCEEDED;
pub use admission::Reply;
pub use admission::TRY_AGAIN_LATER;
#[cfg(feature = "axum")]
pub use caller::CallerId;
pub use caller::CallerIdentity;
pub use caller::CallerLimitLayer;
pub use caller::CallerLimitService;
pub use config::AdmissionConfig;
pub use config::CallerLimitConfig;
pub use error::GatewayError;
pub use layer::AdmissionLayer;
pub use service::AdmissionService;
