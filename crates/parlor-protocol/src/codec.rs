//! Codec trait and implementations for serializing messages.
//!
//! The gateway doesn't care how messages become bytes — anything
//! implementing [`Codec`] will do. [`JsonCodec`] is the default; a
//! binary codec can slot in later without touching any other layer.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts between Rust types and raw bytes.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable, which keeps browser DevTools useful while the client
/// is under development. Behind the `json` feature (on by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
