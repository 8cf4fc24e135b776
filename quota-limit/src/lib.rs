//! # quota-limit
//!
//! `quota-limit` provides the admission primitives used to guard calls to a
//! metered upstream API (for example a hosted chat-completion service).
//!
//! ## Core Philosophy
//!
//! An upstream API usually enforces more than one budget at once. A coarse
//! daily quota caps total spend, a short rolling window caps burst rate, and the
//! upstream itself may still answer "too many requests". This crate models each
//! of those concerns as a small, explicitly owned object that is shared by
//! reference (`Arc`) between concurrent callers. There is no global state.
//!
//! ## Key Concepts
//!
//! * **[`DailyQuota`]**: a per-calendar-day call budget, reset lazily on the
//!   first call of a new day.
//! * **[`SlidingWindowLimiter`]**: a timestamp log that admits at most
//!   `max_in_flight` calls inside any trailing window and suspends callers
//!   until a slot frees up.
//! * **[`RetryingInvoker`]**: drives a bounded number of attempts with a
//!   distinct fixed delay per failure class.
//! * **[`CallerWindow`]**: a keyed per-caller counter for limiting individual
//!   callers independently of the shared budgets.
//!
//! ## Example
//!
//! ```rust
//! use quota_limit::CallOutcome;
//! use quota_limit::DailyQuota;
//! use quota_limit::RetryPolicy;
//! use quota_limit::RetryingInvoker;
//! use quota_limit::SlidingWindowLimiter;
//! use quota_limit::UpstreamError;
//! use std::num::NonZeroUsize;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let quota = DailyQuota::new(10_000);
//! let limiter = SlidingWindowLimiter::new(NonZeroUsize::new(10).unwrap(), Duration::from_secs(1));
//! let invoker = RetryingInvoker::new(RetryPolicy::default());
//!
//! if quota.allow_request() {
//!     let limiter = &limiter;
//!     let outcome = invoker
//!         .execute(move |_attempt| async move {
//!             limiter.acquire().await;
//!             Ok::<_, UpstreamError>("hello")
//!         })
//!         .await;
//!     assert!(matches!(outcome, CallOutcome::Success("hello")));
//! }
//! # }
//! ```

use std::time::Duration;

mod caller_window;
mod daily_quota;
mod error;
mod retry;
mod sliding_window;

pub use caller_window::CallerWindow;
pub use daily_quota::DailyQuota;
pub use daily_quota::DayClock;
pub use daily_quota::LocalDayClock;
pub use error::UpstreamError;
pub use retry::CallOutcome;
pub use retry::RetryPolicy;
pub use retry::RetryingInvoker;
pub use sliding_window::SlidingWindowLimiter;

/// Reasons why a request might be rejected by a non-blocking check.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}
