use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

/// Custom error type for transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Error when the connection to the server fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the request times out
    #[error("Timeout error after {0} ms")]
    Timeout(u64),

    /// Error when the request cannot be built by the transport
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The in-flight call was cancelled
    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Timeouts are the only failure class the dispatcher retries.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Everything the transport needs to put one request on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Status line, headers and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Response with the canonical reason phrase and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Transport defines the port (interface) for sending a request over HTTP
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request and wait for the server's response
    ///
    /// # Arguments
    /// * `request` - Method, fully rendered URL, headers and optional body
    ///
    /// # Returns
    /// A future that resolves to the server's response or a transport-level error.
    /// Non-2xx statuses are responses, not errors.
    async fn send(&self, request: TransportRequest) -> TransportResult<TransportResponse>;
}
