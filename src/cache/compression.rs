//! Payload Compression
//!
//! Byte-to-byte codecs applied to payloads before they are stored.

use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use serde::Serialize;

// == Compression Algorithm ==
/// Codec applied to a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Gzip,
    Deflate,
}

impl CompressionAlgorithm {
    /// Encodes `data` with this algorithm.
    pub fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            CompressionAlgorithm::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            CompressionAlgorithm::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }

    /// Decodes `data` previously produced by [`compress`](Self::compress).
    pub fn decompress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            CompressionAlgorithm::Gzip => GzDecoder::new(data).read_to_end(&mut out)?,
            CompressionAlgorithm::Deflate => DeflateDecoder::new(data).read_to_end(&mut out)?,
        };
        Ok(out)
    }
}

/// Parses the `CACHE_COMPRESSION` setting. `none` maps to `Ok(None)`.
pub fn parse_algorithm(value: &str) -> Result<Option<CompressionAlgorithm>, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "off" => Ok(None),
        other => CompressionAlgorithm::from_str(other).map(Some),
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Ok(CompressionAlgorithm::Gzip),
            "deflate" => Ok(CompressionAlgorithm::Deflate),
            other => Err(format!("Unknown compression algorithm: {}", other)),
        }
    }
}

// == Maybe Compress ==
/// Compresses `data` when an algorithm is configured and the payload is at
/// least `min_size` bytes. Falls back to the raw bytes if encoding fails or
/// does not shrink the payload.
pub fn maybe_compress(
    data: Vec<u8>,
    algorithm: Option<CompressionAlgorithm>,
    min_size: usize,
) -> (Vec<u8>, Option<CompressionAlgorithm>) {
    let Some(algorithm) = algorithm else {
        return (data, None);
    };
    if data.len() < min_size {
        return (data, None);
    }

    match algorithm.compress(&data) {
        Ok(encoded) if encoded.len() < data.len() => (encoded, Some(algorithm)),
        _ => (data, None),
    }
}
