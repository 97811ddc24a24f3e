//! Body encoding and decoding.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Serializer failure, carried as a message so it can live in [`crate::CallError`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Turns request payloads into bytes and response bytes into typed payloads.
pub trait Serializer: Send + Sync + 'static {
    fn serialize<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Bytes, CodecError>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// `serde_json` serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    /// Emit indented JSON (useful when tracing request bodies).
    pub pretty: bool,
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Bytes, CodecError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(payload)?
        } else {
            serde_json::to_vec(payload)?
        };
        Ok(Bytes::from(bytes))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn compact_by_default() {
        let bytes = JsonSerializer::default().serialize(&json!({"a": 1})).unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
    }

    #[test]
    fn decode_error_carries_message() {
        let err = JsonSerializer::default()
            .deserialize::<Value>(b"{not json")
            .unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
