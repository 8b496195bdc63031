//! Record serialization.
//!
//! Records are encoded with `bincode`. The encoding is deterministic for a
//! given value, which content addressing relies on: hashing the encoded
//! bytes of equal records always yields the same id.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialization or deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(pub String);

/// Encode a record to bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError(e.to_string()))
}

/// Decode a record from bytes.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(data).map_err(|e| CodecError(e.to_string()))
}
