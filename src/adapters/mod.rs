pub mod json_codec;
pub mod static_headers;

/// Re-export commonly used types from adapters
pub use json_codec::{JsonReader, JsonWriter};
pub use static_headers::StaticHeadersInterceptor;
