use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use quota_limit::DayClock;
use quota_limit::LocalDayClock;
use tower::BoxError;
use tower::Service;

use crate::Admission;
use crate::Reply;

/// Runs every request through [`Admission::perform`].
///
/// Readiness of the inner service is checked per attempt inside `call`, so
/// `poll_ready` is always ready. The request is cloned for every attempt.
#[derive(Debug)]
pub struct AdmissionService<S, C = LocalDayClock> {
    inner: S,
    admission: Admission<C>,
}

impl<S: Clone, C> Clone for AdmissionService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            admission: self.admission.clone(),
        }
    }
}

impl<S, C> AdmissionService<S, C> {
    pub fn new(inner: S, admission: Admission<C>) -> Self {
        Self { inner, admission }
    }
}

impl<S, C, Req> Service<Req> for AdmissionService<S, C>
where
    S: Service<Req, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    C: DayClock + Send + Sync + 'static,
    Req: Clone + Send + Sync + 'static,
{
    type Response = Reply<S::Response>;
    type Error = BoxError;
    // We return a BoxFuture because we are creating an async block
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let admission = self.admission.clone();
        let inner = self.inner.clone();

        Box::pin(async move {
            admission
                .perform(move || req.clone(), inner)
                .await
                .map_err(BoxError::from)
        })
    }
}
