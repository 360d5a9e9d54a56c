pub mod codec;
pub mod interceptor;
pub mod transport;

pub use codec::{AnyBody, BodyReader, BodyWriter, CodecError, CodecResult};
pub use interceptor::{InterceptedRequest, InterceptorContext, RequestInterceptor};
pub use transport::{
    Transport, TransportError, TransportRequest, TransportResponse, TransportResult,
};
