//! Byte codec: lossless binary ↔ transport-text conversion.
//!
//! Only the transport boundary uses these; the core itself works on raw
//! byte buffers. Every byte survives the round trip, leading zero bytes
//! included.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CoreError, Result};

/// Encode bytes as standard (padded) base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64. Malformed input is corrupt metadata.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| CoreError::CorruptMetadata(format!("invalid base64: {e}")))
}

/// Encode bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex. Malformed input is corrupt metadata.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| CoreError::CorruptMetadata(format!("invalid hex: {e}")))
}

/// Serde adapter storing `Vec<u8>` fields as base64 strings.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode_base64(&text).map_err(serde::de::Error::custom)
    }
}
