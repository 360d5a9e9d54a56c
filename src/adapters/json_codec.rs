//! JSON body codecs backed by `serde_json`.
use std::{any::Any, fmt, marker::PhantomData};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::ports::codec::{AnyBody, BodyReader, BodyWriter, CodecError, CodecResult};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Serializes request bodies of type `T` as JSON.
pub struct JsonWriter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonWriter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonWriter<{}>", std::any::type_name::<T>())
    }
}

impl<T: Serialize + 'static> BodyWriter for JsonWriter<T> {
    fn content_type(&self) -> Option<&str> {
        Some(JSON_CONTENT_TYPE)
    }

    fn write(&self, body: &AnyBody) -> CodecResult<Bytes> {
        let type_name = std::any::type_name::<T>();
        let value = body
            .downcast_ref::<T>()
            .ok_or(CodecError::TypeMismatch {
                expected: type_name,
            })?;
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode {
                type_name,
                reason: e.to_string(),
            })
    }
}

/// Deserializes JSON response bodies into `T`.
pub struct JsonReader<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonReader<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonReader<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonReader<{}>", std::any::type_name::<T>())
    }
}

impl<T: DeserializeOwned + Send + 'static> BodyReader for JsonReader<T> {
    fn read(&self, body: &Bytes) -> CodecResult<Box<dyn Any + Send>> {
        serde_json::from_slice::<T>(body)
            .map(|value| Box::new(value) as Box<dyn Any + Send>)
            .map_err(|e| CodecError::Decode {
                type_name: std::any::type_name::<T>(),
                reason: e.to_string(),
            })
    }
}
