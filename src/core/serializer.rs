//! Serialization Adapter
//!
//! Object/bytes codec used for every stored value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SerializationError;

/// Serialization strategy.
///
/// Strings go through `serialize_string`/`deserialize_string` as raw UTF-8 so
/// plain values are never encoded twice.
pub trait Serializer: Send + Sync + 'static {
    /// Encode a value.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    /// Decode a value of type `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError>;

    /// Encode a plain string.
    fn serialize_string(&self, value: &str) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    /// Decode a plain string.
    fn deserialize_string(&self, bytes: &[u8]) -> Result<String, SerializationError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidUtf8)
    }
}

/// JSON serializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(|e| SerializationError::EncodeFailed {
            message: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(bytes).map_err(|e| SerializationError::DecodeFailed {
            message: e.to_string(),
        })
    }
}
