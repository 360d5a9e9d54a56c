use std::any::Any;

use bytes::Bytes;
use thiserror::Error;

/// Type-erased request body handed to a [`BodyWriter`].
pub type AnyBody = dyn Any + Send + Sync;

/// Errors raised while encoding a request body or decoding a response body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    #[error("Failed to encode {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },

    #[error("Failed to decode {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },

    /// The codec was handed (or produced) a value of another type
    #[error("Body type mismatch: expected {expected}")]
    TypeMismatch { expected: &'static str },
}

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Serializes a request body.
pub trait BodyWriter: Send + Sync {
    /// `Content-Type` to send along with the encoded body, if any
    fn content_type(&self) -> Option<&str> {
        None
    }

    fn write(&self, body: &AnyBody) -> CodecResult<Bytes>;
}

/// Deserializes a response body into the value delivered to the success
/// callback.
pub trait BodyReader: Send + Sync {
    fn read(&self, body: &Bytes) -> CodecResult<Box<dyn Any + Send>>;
}
