use std::time::Duration;

/// Errors produced by the tower-quota middleware stack.
///
/// Quota exhaustion and exhausted transient retries are *not* errors: they are
/// reported as [`Reply`](crate::Reply) sentinels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The upstream kept answering "too many requests" until the retry budget
    /// was spent.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`.
    #[error("Upstream rate limit persisted after {attempts} attempts")]
    UpstreamRateLimited { attempts: u32 },

    /// A single caller exceeded its own window.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("API rate limit exceeded ({limit} requests per minute)")]
    CallerRateLimited {
        limit: usize,
        /// The duration to wait before retrying.
        retry_after: Duration,
    },

    /// The request did not carry a caller identity.
    ///
    /// When the `axum` feature is enabled, this converts to `401 Unauthorized`.
    #[error("Caller identity required")]
    UnknownCaller,
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, msg, headers) = match self {
            Self::UpstreamRateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, self.to_string(), None)
            }
            Self::CallerRateLimited { retry_after, .. } => {
                let secs = retry_after.as_secs().max(1);
                let val = axum::http::HeaderValue::from(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    self.to_string(),
                    Some((axum::http::header::RETRY_AFTER, val)),
                )
            }
            Self::UnknownCaller => (StatusCode::UNAUTHORIZED, self.to_string(), None),
        };

        let mut response = (status, msg).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}
