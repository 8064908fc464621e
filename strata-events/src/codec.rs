//! Payload codec
//!
//! Domain payloads are first lowered to `serde_json::Value`, then a [`Codec`]
//! turns that value into bytes. Swapping the codec changes the wire format
//! without touching domain types.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use tracing::trace;

/// Payload codec
///
/// Implement this trait to plug a different byte encoding into the repository.
pub trait Codec: Send + Sync {
    /// Short name of the encoding, for diagnostics.
    fn name(&self) -> &'static str;

    /// Encode a payload tagged `type_tag`.
    fn encode(&self, type_tag: &str, value: &serde_json::Value) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes previously written for `type_tag`.
    fn decode(&self, type_tag: &str, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// JSON codec
///
/// Accepts every type tag unless built with [`JsonCodec::restricted`], in
/// which case only the registered tags can be encoded or decoded.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    registered: Option<HashSet<String>>,
}

impl JsonCodec {
    /// Create a codec that accepts any type tag
    pub fn new() -> Self {
        Self { registered: None }
    }

    /// Create a codec limited to the given type tags
    pub fn restricted<I, T>(type_tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            registered: Some(type_tags.into_iter().map(Into::into).collect()),
        }
    }

    /// Register an additional type tag
    pub fn register(mut self, type_tag: impl Into<String>) -> Self {
        self.registered
            .get_or_insert_with(HashSet::new)
            .insert(type_tag.into());
        self
    }

    fn accepts(&self, type_tag: &str) -> bool {
        self.registered
            .as_ref()
            .is_none_or(|tags| tags.contains(type_tag))
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, type_tag: &str, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
        if !self.accepts(type_tag) {
            return Err(CodecError::not_encodable(type_tag, "type tag is not registered"));
        }
        serde_json::to_vec(value).map_err(|e| CodecError::not_encodable(type_tag, e))
    }

    fn decode(&self, type_tag: &str, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        if !self.accepts(type_tag) {
            return Err(CodecError::not_decodable(type_tag, "type tag is not registered"));
        }
        serde_json::from_slice(bytes).map_err(|e| CodecError::not_decodable(type_tag, e))
    }
}

/// Codec error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Payload '{type_tag}' is not encodable: {reason}")]
    NotEncodable { type_tag: String, reason: String },

    #[error("Payload '{type_tag}' is not decodable: {reason}")]
    NotDecodable { type_tag: String, reason: String },
}

impl CodecError {
    pub fn not_encodable(type_tag: &str, reason: impl ToString) -> Self {
        CodecError::NotEncodable {
            type_tag: type_tag.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_decodable(type_tag: &str, reason: impl ToString) -> Self {
        CodecError::NotDecodable {
            type_tag: type_tag.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Encode a typed payload through `codec`.
pub fn encode_payload<T: Serialize>(
    codec: &dyn Codec,
    type_tag: &str,
    payload: &T,
) -> Result<Vec<u8>, CodecError> {
    let value =
        serde_json::to_value(payload).map_err(|e| CodecError::not_encodable(type_tag, e))?;
    let bytes = codec.encode(type_tag, &value)?;
    trace!(type_tag, codec = codec.name(), len = bytes.len(), "encoded payload");
    Ok(bytes)
}

/// Decode a typed payload through `codec`.
pub fn decode_payload<T: DeserializeOwned>(
    codec: &dyn Codec,
    type_tag: &str,
    bytes: &[u8],
) -> Result<T, CodecError> {
    let value = codec.decode(type_tag, bytes)?;
    serde_json::from_value(value).map_err(|e| CodecError::not_decodable(type_tag, e))
}
