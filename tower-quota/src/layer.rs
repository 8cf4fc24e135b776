use quota_limit::LocalDayClock;
use tower::Layer;

use crate::Admission;
use crate::service::AdmissionService;

/// Applies daily quota, sliding window and retry admission to requests.
///
/// Every service produced by one layer shares the layer's [`Admission`].
#[derive(Debug)]
pub struct AdmissionLayer<C = LocalDayClock> {
    admission: Admission<C>,
}

impl<C> Clone for AdmissionLayer<C> {
    fn clone(&self) -> Self {
        Self {
            admission: self.admission.clone(),
        }
    }
}

impl<C> AdmissionLayer<C> {
    /// Create an AdmissionLayer
    pub fn new(admission: Admission<C>) -> Self {
        AdmissionLayer { admission }
    }
}

impl<C, S> Layer<S> for AdmissionLayer<C> {
    type Service = AdmissionService<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, self.admission.clone())
    }
}
