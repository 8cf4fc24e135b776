use std::ops::ControlFlow;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::future::Either;
use futures::future::Ready;
use futures::future::ready;
use quota_limit::CallerWindow;
use quota_limit::Reason;
use tower::BoxError;
use tower::Layer;
use tower::Service;

use crate::GatewayError;

/// Identifies who is making a request.
///
/// The key should combine the caller's identity with whatever else should be
/// limited separately (for example the route), since one [`CallerWindow`]
/// counts every distinct key on its own.
pub trait CallerIdentity {
    /// `None` when the request carries no identity.
    fn caller_key(&self) -> Option<String>;
}

/// An authenticated caller id, inserted into request extensions by whatever
/// performs authentication.
#[cfg(feature = "axum")]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(pub String);

#[cfg(feature = "axum")]
impl<B> CallerIdentity for http::Request<B> {
    fn caller_key(&self) -> Option<String> {
        let CallerId(id) = self.extensions().get::<CallerId>()?;
        if id.is_empty() {
            return None;
        }
        Some(format!("{id}{}", self.uri().path()))
    }
}

/// Applies a per-caller window to requests.
#[derive(Debug, Clone)]
pub struct CallerLimitLayer {
    window: Arc<CallerWindow>,
}

impl CallerLimitLayer {
    pub fn new(window: Arc<CallerWindow>) -> Self {
        Self { window }
    }
}

impl<S> Layer<S> for CallerLimitLayer {
    type Service = CallerLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallerLimitService {
            inner,
            window: Arc::clone(&self.window),
        }
    }
}

/// Rejects requests without an identity, or whose caller is over its window.
#[derive(Debug, Clone)]
pub struct CallerLimitService<S> {
    inner: S,
    window: Arc<CallerWindow>,
}

impl<S, Req> Service<Req> for CallerLimitService<S>
where
    S: Service<Req, Error = BoxError>,
    Req: CallerIdentity,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Either<Ready<Result<S::Response, BoxError>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let Some(key) = req.caller_key() else {
            return Either::Left(ready(Err(BoxError::from(GatewayError::UnknownCaller))));
        };

        match self.window.process(&key) {
            ControlFlow::Continue(()) => Either::Right(self.inner.call(req)),
            ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                let err = GatewayError::CallerRateLimited {
                    limit: self.window.limit(),
                    retry_after,
                };
                Either::Left(ready(Err(BoxError::from(err))))
            }
        }
    }
}
