//! Outbound request description.
//!
//! A [`Request`] carries everything the dispatcher needs: method, URL
//! template and bindings, headers, optional typed body, codec overrides,
//! timeout/retry policy, the accepted status codes and the two terminal
//! callbacks (held by its [`RequestLifecycle`]).
use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;

use crate::{
    config::ClientConfig,
    core::{
        dispatcher::{DispatchError, DispatchResult},
        lifecycle::{AbortHandle, FailureCallback, RequestLifecycle, SuccessCallback},
        templater::{Bindings, Context},
    },
    ports::{
        codec::{AnyBody, BodyReader, BodyWriter, CodecError},
        transport::TransportError,
    },
};

/// Statuses accepted as success unless the request overrides them.
pub const DEFAULT_SUCCESS_CODES: [u16; 5] = [200, 201, 202, 203, 204];
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Runtime identity of a Rust type, used by registry matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeInfo {
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn is<T: Any + ?Sized>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

/// What codec registry matchers get to look at.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub method: Method,
    pub template: String,
    pub body_type: Option<TypeInfo>,
    pub response_type: TypeInfo,
}

/// Terminal failure delivered to the failure callback.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum RequestFailure {
    /// The exchange completed but the status is outside the accepted set
    #[error("Server responded with {status} {status_text}")]
    ServerStatus {
        status: StatusCode,
        status_text: String,
        headers: HeaderMap,
        body: Bytes,
    },

    /// Every attempt timed out
    #[error("Request timed out after {attempts} attempts: {cause}")]
    Timeout { attempts: u32, cause: TransportError },

    /// Any other transport failure; never retried
    #[error("Transport failure: {0}")]
    Transport(TransportError),

    #[error("No body writer found for {0}")]
    NoWriterFound(&'static str),

    #[error("No body reader found for {0}")]
    NoReaderFound(&'static str),

    #[error("Codec failure: {0}")]
    Codec(#[from] CodecError),
}

impl RequestFailure {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestFailure::ServerStatus { .. } => "server_status",
            RequestFailure::Timeout { .. } => "timeout",
            RequestFailure::Transport(_) => "transport",
            RequestFailure::NoWriterFound(_) => "no_writer",
            RequestFailure::NoReaderFound(_) => "no_reader",
            RequestFailure::Codec(_) => "codec",
        }
    }

    /// Status code for [`RequestFailure::ServerStatus`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestFailure::ServerStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One outbound request whose success callback receives a `T`.
///
/// `T = ()` marks a void response: success never consults a reader.
pub struct Request<T> {
    pub(crate) method: Method,
    pub(crate) template: String,
    pub(crate) bindings: Bindings,
    pub(crate) headers: HeaderMap,
    pub(crate) root: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) body: Option<Box<AnyBody>>,
    pub(crate) body_type: Option<TypeInfo>,
    pub(crate) writer: Option<Arc<dyn BodyWriter>>,
    pub(crate) reader: Option<Arc<dyn BodyReader>>,
    pub(crate) timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) retry_count: u32,
    pub(crate) success_codes: Vec<u16>,
    pub(crate) lifecycle: Arc<RequestLifecycle<T>>,
}

impl<T: Send + 'static> Request<T> {
    /// Start building a request for `method` against the URL `template`.
    pub fn builder(method: impl AsRef<str>, template: impl Into<String>) -> RequestBuilder<T> {
        RequestBuilder::new(method, template)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Service root override.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Explicit full URL override; bypasses root resolution and templating.
    pub fn url_override(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn success_codes(&self) -> &[u16] {
        &self.success_codes
    }

    pub fn accepts(&self, status: StatusCode) -> bool {
        self.success_codes.contains(&status.as_u16())
    }

    pub fn is_void(&self) -> bool {
        TypeInfo::of::<T>().is::<()>()
    }

    pub fn metadata(&self) -> RequestMetadata {
        RequestMetadata {
            method: self.method.clone(),
            template: self.template.clone(),
            body_type: self.body_type,
            response_type: TypeInfo::of::<T>(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<RequestLifecycle<T>> {
        &self.lifecycle
    }

    /// Handle that aborts this request whether or not it was sent yet.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.lifecycle.clone())
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("template", &self.template)
            .field("root", &self.root)
            .field("url", &self.url)
            .field("body_type", &self.body_type)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("success_codes", &self.success_codes)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Request`]. Invalid input is reported by [`RequestBuilder::build`].
pub struct RequestBuilder<T> {
    method: String,
    template: String,
    bindings: Bindings,
    headers: HeaderMap,
    root: Option<String>,
    url: Option<String>,
    body: Option<(Box<AnyBody>, TypeInfo)>,
    writer: Option<Arc<dyn BodyWriter>>,
    reader: Option<Arc<dyn BodyReader>>,
    timeout: Duration,
    max_retries: u32,
    success_codes: Vec<u16>,
    on_success: Option<SuccessCallback<T>>,
    on_failure: Option<FailureCallback>,
    error: Option<DispatchError>,
}

impl<T: Send + 'static> RequestBuilder<T> {
    pub fn new(method: impl AsRef<str>, template: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_string(),
            template: template.into(),
            bindings: Bindings::new(),
            headers: HeaderMap::new(),
            root: None,
            url: None,
            body: None,
            writer: None,
            reader: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: 0,
            success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
            on_success: None,
            on_failure: None,
            error: None,
        }
    }

    /// Take timeout, retries and accepted statuses from `config`.
    pub fn defaults(mut self, config: &ClientConfig) -> Self {
        self.timeout = Duration::from_millis(config.timeout_ms);
        self.max_retries = config.max_retries;
        self.success_codes = config.success_codes.clone();
        self
    }

    pub fn path_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.param(Context::Path, name, value)
    }

    pub fn matrix_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.param(Context::Matrix, name, value)
    }

    pub fn query_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.param(Context::Query, name, value)
    }

    pub fn fragment_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.param(Context::Fragment, name, value)
    }

    /// Binding for `{name}` placeholders in header values.
    pub fn header_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.param(Context::Header, name, value)
    }

    pub fn param(
        mut self,
        context: Context,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.bindings.insert(context, name, value);
        self
    }

    /// Replace all bindings, e.g. with [`Bindings::shared`].
    pub fn bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Add a header. `{name}` placeholders in `value` are filled from the
    /// header bindings when the request is sent.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error.get_or_insert(DispatchError::InvalidArgument(format!(
                    "invalid header {name}: {value}"
                )));
            }
        }
        self
    }

    /// Service root for this request only.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Full URL, bypassing templating and root resolution.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Request body. Sent only for POST, PUT and PATCH.
    pub fn body<B: Any + Send + Sync>(mut self, body: B) -> Self {
        self.body = Some((Box::new(body), TypeInfo::of::<B>()));
        self
    }

    pub fn writer(mut self, writer: Arc<dyn BodyWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn reader(mut self, reader: Arc<dyn BodyReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.timeout = Duration::from_millis(millis);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn success_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.success_codes = codes.into_iter().collect();
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl FnOnce(RequestFailure) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> DispatchResult<Request<T>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let method_name = self.method.trim();
        if method_name.is_empty() {
            return Err(DispatchError::InvalidArgument(
                "method must not be empty".to_string(),
            ));
        }
        let method = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes())
            .map_err(|_| DispatchError::InvalidArgument(format!("invalid method: {method_name}")))?;

        if self.url.is_none() && self.template.trim().is_empty() {
            return Err(DispatchError::InvalidArgument(
                "template must not be empty".to_string(),
            ));
        }

        let mut success_codes = self.success_codes;
        success_codes.sort_unstable();
        success_codes.dedup();

        let (body, body_type) = match self.body {
            Some((body, info)) => (Some(body), Some(info)),
            None => (None, None),
        };

        Ok(Request {
            method,
            template: self.template,
            bindings: self.bindings,
            headers: self.headers,
            root: self.root,
            url: self.url,
            body,
            body_type,
            writer: self.writer,
            reader: self.reader,
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_count: 0,
            success_codes,
            lifecycle: Arc::new(RequestLifecycle::new(self.on_success, self.on_failure)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::RequestState;

    #[test]
    fn test_builder_defaults() {
        let request = Request::<()>::builder("get", "/users/{id}")
            .path_param("id", "1")
            .build()
            .unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.success_codes(), DEFAULT_SUCCESS_CODES);
        assert_eq!(request.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(request.max_retries(), 0);
        assert!(request.is_void());
        assert_eq!(request.bindings().get(Context::Path, "id"), Some("1"));
        assert_eq!(request.lifecycle().state(), RequestState::Ready);
    }

    #[test]
    fn test_empty_method_or_template_is_invalid() {
        assert!(matches!(
            Request::<()>::builder("", "/a").build(),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            Request::<()>::builder("GET", "  ").build(),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(
            Request::<()>::builder("GET", "")
                .url("http://example.com/a")
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_invalid_header_is_reported_on_build() {
        let result = Request::<()>::builder("GET", "/a")
            .header("bad header", "v")
            .build();
        assert!(matches!(result, Err(DispatchError::InvalidArgument(_))));
    }

    #[test]
    fn test_header_params_are_kept_apart_from_path_params() {
        let request = Request::<()>::builder("GET", "/a")
            .header("authorization", "Bearer {token}")
            .header_param("token", "abc")
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer {token}");
        assert_eq!(request.bindings().get(Context::Header, "token"), Some("abc"));
        assert_eq!(request.bindings().get(Context::Path, "token"), None);
    }

    #[test]
    fn test_metadata_reports_types() {
        let request = Request::<String>::builder("POST", "/items")
            .body(42u32)
            .build()
            .unwrap();
        let metadata = request.metadata();
        assert!(metadata.response_type.is::<String>());
        assert!(metadata.body_type.unwrap().is::<u32>());
        assert!(!request.is_void());
    }

    #[test]
    fn test_accepts_only_configured_codes() {
        let request = Request::<()>::builder("GET", "/a")
            .success_codes([200, 304, 200])
            .build()
            .unwrap();
        assert_eq!(request.success_codes(), [200, 304]);
        assert!(request.accepts(StatusCode::NOT_MODIFIED));
        assert!(!request.accepts(StatusCode::CREATED));
    }

    #[test]
    fn test_defaults_from_config() {
        let config = ClientConfig {
            timeout_ms: 1500,
            max_retries: 3,
            success_codes: vec![200],
            ..ClientConfig::default()
        };
        let request = Request::<()>::builder("GET", "/a")
            .defaults(&config)
            .build()
            .unwrap();
        assert_eq!(request.timeout(), Duration::from_millis(1500));
        assert_eq!(request.max_retries(), 3);
        assert_eq!(request.success_codes(), [200]);
    }
}
