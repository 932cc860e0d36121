use serde_json::Value;

/// Error produced by a [`Codec`].
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Marshal/unmarshal pair used for structured request and response bodies.
///
/// Values travel through the `serde_json::Value` data model, so any serde
/// type can be encoded by any codec.
pub trait Codec: Send + Sync {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// JSON codec (the default).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
