/// Classification of a single failed call to the upstream service.
///
/// The upstream port reports failures as data rather than as a type hierarchy,
/// so the retry policy can branch on the variant alone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream explicitly answered "too many requests".
    ///
    /// Retried after the policy's rate-limit delay. If the final attempt still
    /// sees this, the failure is propagated to the caller.
    #[error("Upstream rejected the call: too many requests")]
    RateLimited,

    /// Any other failure: network errors, malformed responses or non rate-limit
    /// error statuses.
    ///
    /// Retried after the policy's base delay. If the final attempt still sees
    /// this, the caller receives a fixed fallback instead of the raw error.
    #[error("Transient upstream failure: {0}")]
    Transient(String),
}

impl UpstreamError {
    /// Build a [`UpstreamError::Transient`] from anything displayable.
    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::Transient(err.to_string())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}
