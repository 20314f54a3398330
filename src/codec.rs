//! Codec Module
//!
//! Object <-> byte encoding (JSON) and the optional gzip/flate/zlib transform
//! applied on top of it.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Compression Algorithm ==
/// Compression applied to encoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressAlg {
    #[default]
    None,
    Gzip,
    Flate,
    Zlib,
}

impl CompressAlg {
    /// Every real algorithm, excluding `None`.
    pub const ALL: [CompressAlg; 3] = [CompressAlg::Gzip, CompressAlg::Flate, CompressAlg::Zlib];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressAlg::None => "none",
            CompressAlg::Gzip => "gzip",
            CompressAlg::Flate => "flate",
            CompressAlg::Zlib => "zlib",
        }
    }

    /// Returns true unless this is `None`.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompressAlg::None)
    }
}

impl fmt::Display for CompressAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressAlg {
    type Err = CacheError;

    /// Parses an algorithm identifier. Empty and `none` both mean no compression.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(CompressAlg::None),
            "gzip" => Ok(CompressAlg::Gzip),
            "flate" => Ok(CompressAlg::Flate),
            "zlib" => Ok(CompressAlg::Zlib),
            other => Err(CacheError::Configuration(format!(
                "unknown compression algorithm '{}'",
                other
            ))),
        }
    }
}

// == Encoding ==
/// Encodes a value as JSON bytes.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes JSON bytes into a value.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// == Compression ==
/// Compresses raw bytes. `None` returns the input unchanged.
pub fn compress(input: &[u8], alg: CompressAlg) -> Result<Vec<u8>> {
    let output = match alg {
        CompressAlg::None => input.to_vec(),
        CompressAlg::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(input)?;
            encoder.finish()?
        }
        CompressAlg::Flate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(input)?;
            encoder.finish()?
        }
        CompressAlg::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(input)?;
            encoder.finish()?
        }
    };
    Ok(output)
}

/// Reverses [`compress`].
pub fn decompress(input: &[u8], alg: CompressAlg) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    match alg {
        CompressAlg::None => output.extend_from_slice(input),
        CompressAlg::Gzip => {
            GzDecoder::new(input).read_to_end(&mut output)?;
        }
        CompressAlg::Flate => {
            DeflateDecoder::new(input).read_to_end(&mut output)?;
        }
        CompressAlg::Zlib => {
            ZlibDecoder::new(input).read_to_end(&mut output)?;
        }
    }
    Ok(output)
}

/// JSON-encodes then compresses.
pub fn encode<T: Serialize + ?Sized>(value: &T, alg: CompressAlg) -> Result<Vec<u8>> {
    compress(&to_bytes(value)?, alg)
}

/// Decompresses then JSON-decodes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], alg: CompressAlg) -> Result<T> {
    from_bytes(&decompress(bytes, alg)?)
}

/// Decodes bytes read back from a byte-oriented store.
///
/// Plain JSON is tried first. When that fails and `alg` is enabled, the bytes
/// are treated as compressed JSON, so values written before compression was
/// switched on stay readable.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8], alg: CompressAlg) -> Result<T> {
    match from_bytes(bytes) {
        Ok(value) => Ok(value),
        Err(_) if alg.is_enabled() => decode(bytes, alg),
        Err(err) => Err(err),
    }
}
