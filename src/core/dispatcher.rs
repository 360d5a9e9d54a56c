//! Request dispatch orchestration.
//!
//! [`Dispatcher::send`] drives one request through:
//! 1. URL normalization (root resolution, templating, [`PathExpression`])
//!    and header templating
//! 2. the interceptor barrier (every interceptor must proceed)
//! 3. body encoding and the transport call
//! 4. response classification against the accepted status codes
//! 5. timeout retries (the only retried failure class)
//!
//! Normalization and lifecycle errors are returned synchronously. Once the
//! request is `Sent`, every outcome goes through the request's callbacks.
use std::{
    any::Any,
    sync::{Arc, Mutex, PoisonError},
};

use http::{HeaderMap, HeaderValue, Method, header};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    adapters::StaticHeadersInterceptor,
    config::ClientConfig,
    core::{
        lifecycle::{AbortHandle, LifecycleError, RequestState},
        path_expression::{PathError, PathExpression, join_root},
        registry::{CodecRegistry, RootResolver},
        request::{Request, RequestFailure, RequestMetadata},
        templater::{TemplateError, Templater},
    },
    metrics,
    ports::{
        codec::CodecError,
        interceptor::{InterceptedRequest, InterceptorContext, RequestInterceptor},
        transport::{Transport, TransportError, TransportRequest, TransportResponse},
    },
    tracing_setup,
    utils::countdown::Countdown,
};

/// Errors reported synchronously by [`Dispatcher::send`] and request building.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Methods whose requests carry a body.
pub fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Configuration objects handed to [`Dispatcher::new`].
#[derive(Default)]
pub struct DispatcherOptions {
    pub roots: RootResolver,
    pub codecs: CodecRegistry,
    pub interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

/// Sends requests through a [`Transport`]. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    roots: Arc<RootResolver>,
    codecs: Arc<CodecRegistry>,
    interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, options: DispatcherOptions) -> Self {
        Self {
            transport,
            roots: Arc::new(options.roots),
            codecs: Arc::new(options.codecs),
            interceptors: options.interceptors.into(),
        }
    }

    /// Dispatcher with roots and default headers taken from `config`.
    pub fn from_config(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        codecs: CodecRegistry,
    ) -> Self {
        let mut interceptors: Vec<Arc<dyn RequestInterceptor>> = Vec::new();
        if !config.default_headers.is_empty() {
            interceptors.push(Arc::new(StaticHeadersInterceptor::from_map(
                &config.default_headers,
            )));
        }

        Self::new(
            transport,
            DispatcherOptions {
                roots: RootResolver::from_config(config),
                codecs,
                interceptors,
            },
        )
    }

    pub fn roots(&self) -> &RootResolver {
        &self.roots
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Compute the request's URL: the explicit override if set, otherwise
    /// the formatted template joined onto the root from the request or the
    /// root resolver.
    pub fn normalize_url<T: Send + 'static>(
        &self,
        request: &Request<T>,
    ) -> DispatchResult<PathExpression> {
        if let Some(url) = request.url_override() {
            return Ok(PathExpression::parse(url, origin_of(url))?);
        }

        let root = match request.root() {
            Some(root) => root.to_string(),
            None => self.roots.resolve(request.template()),
        };
        let root = root.trim_end_matches('/');
        let path = Templater::format_url(request.template(), request.bindings())?;
        let full = join_root(root, &path);
        tracing::debug!(template = request.template(), url = %full, "Normalized request URL");

        Ok(PathExpression::parse(&full, Some(root))?)
    }

    /// The request's headers with `{name}` placeholders in their values
    /// filled from the header bindings.
    pub fn normalize_headers<T: Send + 'static>(
        &self,
        request: &Request<T>,
    ) -> DispatchResult<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(request.headers().len());
        for (name, value) in request.headers() {
            let value = match value.to_str() {
                Ok(text) if text.contains('{') => {
                    let text = Templater::format_header(text, request.bindings())?;
                    HeaderValue::from_str(&text).map_err(|_| {
                        DispatchError::InvalidArgument(format!("invalid header {name}: {text}"))
                    })?
                }
                _ => value.clone(),
            };
            headers.append(name.clone(), value);
        }
        Ok(headers)
    }

    /// Normalize the URL, mark the request `Sent` and run the rest of the
    /// pipeline on a spawned task. Must be called within a tokio runtime.
    pub fn send<T: Send + 'static>(&self, request: Request<T>) -> DispatchResult<RequestHandle> {
        let url = self.normalize_url(&request)?;
        let headers = self.normalize_headers(&request)?;
        request.lifecycle().execute()?;

        let span = tracing_setup::create_request_span(
            request.method().as_str(),
            request.template(),
            &url.render(),
        );
        let control = request.abort_handle();
        let dispatcher = self.clone();
        let task = tokio::spawn(dispatcher.run(request, url, headers).instrument(span));

        Ok(RequestHandle { control, task })
    }

    async fn run<T: Send + 'static>(
        self,
        mut request: Request<T>,
        url: PathExpression,
        headers: HeaderMap,
    ) {
        let lifecycle = request.lifecycle().clone();
        let cancel = lifecycle.cancellation();
        let method = request.method().clone();
        let metadata = request.metadata();
        let _timer = metrics::RequestTimer::new(method.as_str());

        let intercepted = InterceptedRequest {
            method: method.clone(),
            url,
            headers,
            metadata: metadata.clone(),
        };
        let intercepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Aborted while waiting for interceptors");
                metrics::increment_request_total(method.as_str(), "aborted");
                return;
            }
            intercepted = self.run_interceptors(intercepted) => intercepted,
        };

        let mut transport_request = TransportRequest {
            method: intercepted.method,
            url: intercepted.url.render(),
            headers: intercepted.headers,
            body: None,
        };
        tracing::Span::current().record("url.full", transport_request.url.as_str());

        let outcome = match self.encode_body(&request, &metadata, &mut transport_request) {
            Ok(()) => self.attempt(&mut request, &metadata, transport_request).await,
            Err(failure) => Some(Err(failure)),
        };
        let Some(outcome) = outcome else {
            metrics::increment_request_total(method.as_str(), "aborted");
            return;
        };

        let label = match &outcome {
            Ok(_) => "success",
            Err(failure) => failure.kind(),
        };
        metrics::increment_request_total(method.as_str(), label);
        tracing::Span::current().record("request.outcome", label);

        match &outcome {
            Ok(_) => tracing::info!(attempts = request.retry_count + 1, "Request succeeded"),
            Err(failure) => tracing::info!(error = %failure, "Request failed"),
        }
        if let Err(err) = lifecycle.server_response_received(outcome) {
            tracing::error!(error = %err, "Could not deliver request outcome");
        }
    }

    /// Send attempts until success, a non-timeout failure or retry
    /// exhaustion. `None` means the request was aborted mid-flight.
    async fn attempt<T: Send + 'static>(
        &self,
        request: &mut Request<T>,
        metadata: &RequestMetadata,
        transport_request: TransportRequest,
    ) -> Option<Result<T, RequestFailure>> {
        let cancel = request.lifecycle().cancellation();
        let timeout_ms = u64::try_from(request.timeout().as_millis()).unwrap_or(u64::MAX);

        loop {
            metrics::increment_send_attempts(transport_request.method.as_str());
            tracing::Span::current().record("request.attempts", request.retry_count + 1);
            tracing::info!(
                method = %transport_request.method,
                url = %transport_request.url,
                attempt = request.retry_count + 1,
                "Sending request"
            );

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("In-flight request cancelled by abort");
                    return None;
                }
                sent = tokio::time::timeout(
                    request.timeout(),
                    self.transport.send(transport_request.clone()),
                ) => sent,
            };

            let cause = match sent {
                Ok(Ok(response)) => return Some(self.classify(request, metadata, response)),
                Ok(Err(err)) if err.is_timeout() => err,
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "Transport failure");
                    return Some(Err(RequestFailure::Transport(err)));
                }
                Err(_elapsed) => TransportError::Timeout(timeout_ms),
            };

            if request.retry_count >= request.max_retries() {
                return Some(Err(RequestFailure::Timeout {
                    attempts: request.retry_count + 1,
                    cause,
                }));
            }
            request.retry_count += 1;
            metrics::increment_retries(transport_request.method.as_str());
            tracing::warn!(
                retry = request.retry_count,
                max_retries = request.max_retries(),
                "Request timed out, retrying"
            );
        }
    }

    /// Resolve a writer and serialize the body into `transport_request`.
    fn encode_body<T: Send + 'static>(
        &self,
        request: &Request<T>,
        metadata: &RequestMetadata,
        transport_request: &mut TransportRequest,
    ) -> Result<(), RequestFailure> {
        if !carries_body(request.method()) {
            return Ok(());
        }
        let (Some(body), Some(body_type)) = (request.body.as_deref(), request.body_type) else {
            return Ok(());
        };

        let writer = request
            .writer
            .clone()
            .or_else(|| self.codecs.find_writer(metadata))
            .ok_or(RequestFailure::NoWriterFound(body_type.name))?;
        tracing::debug!(body_type = body_type.name, "Encoding request body");

        transport_request.body = Some(writer.write(body)?);
        if let Some(content_type) = writer.content_type() {
            if !transport_request.headers.contains_key(header::CONTENT_TYPE) {
                match HeaderValue::from_str(content_type) {
                    Ok(value) => {
                        transport_request
                            .headers
                            .insert(header::CONTENT_TYPE, value);
                    }
                    Err(_) => {
                        tracing::warn!(content_type, "Ignoring invalid writer content type")
                    }
                }
            }
        }
        Ok(())
    }

    fn classify<T: Send + 'static>(
        &self,
        request: &Request<T>,
        metadata: &RequestMetadata,
        response: TransportResponse,
    ) -> Result<T, RequestFailure> {
        tracing::debug!(status = response.status.as_u16(), "Received response");
        if !request.accepts(response.status) {
            return Err(RequestFailure::ServerStatus {
                status: response.status,
                status_text: response.status_text,
                headers: response.headers,
                body: response.body,
            });
        }

        let value: Box<dyn Any + Send> = if request.is_void() {
            Box::new(())
        } else {
            let reader = request
                .reader
                .clone()
                .or_else(|| self.codecs.find_reader(metadata))
                .ok_or(RequestFailure::NoReaderFound(metadata.response_type.name))?;
            reader.read(&response.body)?
        };

        value.downcast::<T>().map(|value| *value).map_err(|_| {
            RequestFailure::Codec(CodecError::TypeMismatch {
                expected: metadata.response_type.name,
            })
        })
    }

    /// Notify every interceptor, then wait until all of them proceed.
    async fn run_interceptors(&self, request: InterceptedRequest) -> InterceptedRequest {
        if self.interceptors.is_empty() {
            return request;
        }

        let shared = Arc::new(Mutex::new(request));
        let (countdown, signals) = Countdown::new(self.interceptors.len());
        for (interceptor, ready) in self.interceptors.iter().zip(signals) {
            tracing::debug!(interceptor = interceptor.name(), "Notifying interceptor");
            interceptor.intercept(InterceptorContext::new(shared.clone(), ready));
        }
        countdown.wait().await;

        let request = shared.lock().unwrap_or_else(PoisonError::into_inner);
        request.clone()
    }
}

/// `scheme://authority` prefix of an absolute URL.
fn origin_of(url: &str) -> Option<&str> {
    let scheme_end = url.find("://")? + 3;
    let authority_end = url[scheme_end..]
        .find(['/', '?', '#'])
        .map_or(url.len(), |idx| scheme_end + idx);
    Some(&url[..authority_end])
}

/// Handle to a request in flight.
#[derive(Debug)]
pub struct RequestHandle {
    control: AbortHandle,
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Abort the request; see [`RequestLifecycle::abort`](crate::core::RequestLifecycle::abort).
    pub fn abort(&self) -> bool {
        self.control.abort()
    }

    pub fn state(&self) -> RequestState {
        self.control.state()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.control.clone()
    }

    /// Wait for the pipeline task to finish. Callbacks have run (or been
    /// dropped by an abort) once this returns.
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "Request task failed");
        }
    }
}
