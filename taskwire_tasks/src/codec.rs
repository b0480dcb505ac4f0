use serde_json::Value;

use crate::error::CodecError;

/// Turns task arguments and return values into bytes for transport, and back.
///
/// A namespace is free to use whatever wire shape it wants — this only fixes
/// the in-memory representation ([`serde_json::Value`]) that the [`crate::Router`]
/// and [`crate::Transport`] agree to exchange with a codec.
pub trait Codec: Send + Sync {
    /// Serializes a value to bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Deserializes bytes back into a value.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// The default [`Codec`]: plain JSON, standing in for the interop-friendly
/// `pickle` encoding of the original Python implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|error| CodecError::new("failed to encode JSON value", error))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|error| CodecError::new("failed to decode JSON value", error))
    }
}
