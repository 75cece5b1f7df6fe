//! Gzip and gzip+base64 helpers.
//!
//! Stored values (live auctions, history entries, items) are gzip-encoded
//! JSON. Large reply payloads are gzip-encoded JSON wrapped in standard
//! base64 so they fit in the string `data` field of the reply envelope.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AhxError;

pub type CodecError = AhxError;

/// Gzip-encode a byte slice.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decode a gzip stream. Malformed framing is a [`AhxError::Codec`].
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AhxError::Codec(format!("gzip decode: {e}")))?;
    Ok(out)
}

/// Serialize to JSON and gzip.
pub fn to_gzip_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    gzip(&serde_json::to_vec(value)?)
}

/// Gunzip and deserialize JSON.
pub fn from_gzip_json<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(&gunzip(data)?)?)
}

/// Serialize to JSON, gzip, then base64. This is the reply `data` encoding.
pub fn to_gzip_base64_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    Ok(STANDARD.encode(to_gzip_json(value)?))
}

/// Inverse of [`to_gzip_base64_json`].
pub fn from_gzip_base64_json<T: DeserializeOwned>(data: &str) -> Result<T, CodecError> {
    let raw = STANDARD
        .decode(data)
        .map_err(|e| AhxError::Codec(format!("base64 decode: {e}")))?;
    from_gzip_json(&raw)
}
