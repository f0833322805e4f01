//! Pluggable encoder/decoder pairs

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

/// A representation that can be stored as a Redis string value
pub trait RedisRepresentable: Sized + Send + 'static {
    /// Convert into the bytes written to the store
    fn into_bytes(self) -> Vec<u8>;

    /// Convert from the bytes read from the store
    fn from_bytes(bytes: Vec<u8>) -> Result<Self>;
}

impl RedisRepresentable for Vec<u8> {
    fn into_bytes(self) -> Vec<u8> {
        self
    }

    fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(bytes)
    }
}

impl RedisRepresentable for String {
    fn into_bytes(self) -> Vec<u8> {
        String::into_bytes(self)
    }

    fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        String::from_utf8(bytes).map_err(|e| Error::Decoding(e.to_string()))
    }
}

/// Encoder half of a coder pair
///
/// Implementations must be usable from many tasks at once; the cache holds
/// one instance for its whole lifetime.
pub trait CacheEncoder: Send + Sync + 'static {
    /// Representation produced by this encoder
    type Output: RedisRepresentable;

    /// Name of the format (for logging)
    fn name(&self) -> &str;

    /// Encode a value
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Self::Output>;
}

/// Decoder half of a coder pair
pub trait CacheDecoder: Send + Sync + 'static {
    /// Representation consumed by this decoder
    type Input: RedisRepresentable;

    /// Name of the format (for logging)
    fn name(&self) -> &str;

    /// Decode a value
    fn decode<T: DeserializeOwned>(&self, input: Self::Input) -> Result<T>;
}

/// JSON encoder (default)
///
/// Human-readable, widely compatible, good for debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    pretty: bool,
}

impl JsonEncoder {
    /// Compact output
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl CacheEncoder for JsonEncoder {
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| Error::Encoding(e.to_string()))
    }
}

/// JSON decoder (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl CacheDecoder for JsonDecoder {
    type Input = Vec<u8>;

    fn name(&self) -> &str {
        "json"
    }

    fn decode<T: DeserializeOwned>(&self, input: Vec<u8>) -> Result<T> {
        serde_json::from_slice(&input).map_err(|e| Error::Decoding(e.to_string()))
    }
}

/// MessagePack encoder, the structured binary default
///
/// Keeps field names so values survive schema additions.
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackEncoder;

#[cfg(feature = "msgpack")]
impl CacheEncoder for MsgPackEncoder {
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "msgpack"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| Error::Encoding(e.to_string()))
    }
}

/// MessagePack decoder
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackDecoder;

#[cfg(feature = "msgpack")]
impl CacheDecoder for MsgPackDecoder {
    type Input = Vec<u8>;

    fn name(&self) -> &str {
        "msgpack"
    }

    fn decode<T: DeserializeOwned>(&self, input: Vec<u8>) -> Result<T> {
        rmp_serde::from_slice(&input).map_err(|e| Error::Decoding(e.to_string()))
    }
}

/// Bincode encoder (optional)
///
/// Fastest and most compact, but not human-readable or cross-language.
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEncoder;

#[cfg(feature = "bincode")]
impl CacheEncoder for BincodeEncoder {
    type Output = Vec<u8>;

    fn name(&self) -> &str {
        "bincode"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| Error::Encoding(e.to_string()))
    }
}

/// Bincode decoder (optional)
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeDecoder;

#[cfg(feature = "bincode")]
impl CacheDecoder for BincodeDecoder {
    type Input = Vec<u8>;

    fn name(&self) -> &str {
        "bincode"
    }

    fn decode<T: DeserializeOwned>(&self, input: Vec<u8>) -> Result<T> {
        let (value, _len) = bincode::serde::decode_from_slice(&input, bincode::config::standard())
            .map_err(|e| Error::Decoding(e.to_string()))?;
        Ok(value)
    }
}
