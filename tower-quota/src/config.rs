//! Configuration for the admission stack.
//!
//! Values are layered, later sources overriding earlier ones:
//! 1. Bundled defaults (`quota.toml` shipped with this crate)
//! 2. An optional user file
//! 3. `QUOTA_*` environment variables (`QUOTA_DAILY_LIMIT`,
//!    `QUOTA_CALLER_LIMIT__PER_WINDOW`, ...)
//!
//! Configuration is read once; the built objects never re-read it.

use std::num::NonZeroU32;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use quota_limit::CallerWindow;
use quota_limit::DailyQuota;
use quota_limit::RetryPolicy;
use quota_limit::SlidingWindowLimiter;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::instrument;

use crate::Admission;

const DEFAULT_CONFIG: &str = include_str!("../quota.toml");

/// Limits applied to each caller independently.
///
/// ```toml
/// [caller_limit]
/// per_window = 20
/// window_ms = 60_000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CallerLimitConfig {
    /// Requests per caller above which further requests are rejected
    pub per_window: NonZeroUsize,

    /// How long a caller's counter lives after its last admitted request
    pub window_ms: u64,
}

impl CallerLimitConfig {
    pub fn window(&self) -> CallerWindow {
        CallerWindow::new(self.per_window, Duration::from_millis(self.window_ms))
    }
}

/// Settings for one upstream's admission stack.
///
/// ```toml
/// daily_limit = 10_000
/// max_in_flight = 10
/// window_ms = 1_000
/// max_attempts = 3
/// retry_delay_ms = 1_000
/// rate_limit_retry_delay_ms = 5_000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdmissionConfig {
    /// Calls allowed per calendar day
    pub daily_limit: u32,

    /// Calls allowed inside any trailing window
    pub max_in_flight: NonZeroUsize,

    /// Length of the trailing window
    pub window_ms: u64,

    /// Attempts per call, including the first
    pub max_attempts: NonZeroU32,

    /// Pause before retrying a transient failure
    pub retry_delay_ms: u64,

    /// Pause before retrying after the upstream rate limited us
    pub rate_limit_retry_delay_ms: u64,

    /// Per-caller limits; absent disables them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_limit: Option<CallerLimitConfig>,
}

impl AdmissionConfig {
    /// Load the bundled defaults overridden by `QUOTA_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(None, environment())
    }

    /// Load the bundled defaults, then `path`, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the merged values do not
    /// deserialize (for example a zero `max_in_flight`).
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading admission configuration from file");
        Self::from_sources(Some(path.as_ref()), environment())
    }

    pub(crate) fn from_sources(
        path: Option<&Path>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder.add_source(env).build()?.try_deserialize()
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.rate_limit_retry_delay_ms),
        )
    }

    /// Build the shared quota, window and retry policy.
    pub fn build(&self) -> Admission {
        Admission::new(
            Arc::new(DailyQuota::new(self.daily_limit)),
            Arc::new(SlidingWindowLimiter::new(self.max_in_flight, self.window())),
            self.retry_policy(),
        )
    }

    pub fn caller_window(&self) -> Option<CallerWindow> {
        self.caller_limit.as_ref().map(CallerLimitConfig::window)
    }
}

/// `QUOTA_DAILY_LIMIT` sets `daily_limit`; `__` descends into tables, as in
/// `QUOTA_CALLER_LIMIT__PER_WINDOW`.
pub(crate) fn environment() -> Environment {
    Environment::with_prefix("QUOTA")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
