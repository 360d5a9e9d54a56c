use std::sync::{Arc, Mutex, PoisonError};

use http::{HeaderMap, Method};

use crate::{
    core::{PathExpression, RequestMetadata},
    utils::countdown::ReadySignal,
};

/// The mutable view of an outbound request handed to interceptors.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    /// Normalized URL; query and matrix parameters may still be changed.
    pub url: PathExpression,
    pub headers: HeaderMap,
    pub metadata: RequestMetadata,
}

/// Handle given to one interceptor for one request.
///
/// The interceptor may mutate the request at any point before calling
/// [`InterceptorContext::proceed`], from any task. The request is sent only
/// after every registered interceptor has proceeded.
#[derive(Debug)]
pub struct InterceptorContext {
    request: Arc<Mutex<InterceptedRequest>>,
    ready: ReadySignal,
}

impl InterceptorContext {
    pub(crate) fn new(request: Arc<Mutex<InterceptedRequest>>, ready: ReadySignal) -> Self {
        Self { request, ready }
    }

    /// Run `f` with exclusive access to the request.
    pub fn with_request<R>(&self, f: impl FnOnce(&mut InterceptedRequest) -> R) -> R {
        let mut guard = self
            .request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Signal that this interceptor is done with the request.
    pub fn proceed(self) {
        self.ready.signal();
    }
}

/// RequestInterceptor defines the port for pre-send request hooks
///
/// `intercept` is a notification: it must return promptly and may hand the
/// context to another task to finish asynchronously. Interceptors are
/// notified in no particular order.
pub trait RequestInterceptor: Send + Sync + 'static {
    fn intercept(&self, context: InterceptorContext);

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
