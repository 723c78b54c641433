//! Cache Entry Module
//!
//! Defines the cached response artifact and its compression marker.

use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::compression::CompressionAlgorithm;

// == Cache Entry ==
/// A captured response, immutable once admitted.
///
/// `payload` always holds the stored form; when `compression` is set the
/// bytes must be decoded before they are served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Stored (possibly compressed) response body
    pub payload: Vec<u8>,
    /// Group-invalidation labels
    pub tags: BTreeSet<String>,
    /// Selected response headers replayed on a hit
    pub headers: HashMap<String, String>,
    /// Codec applied to `payload`, None = stored raw
    pub compression: Option<CompressionAlgorithm>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an uncompressed entry with no tags or headers.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            tags: BTreeSet::new(),
            headers: HashMap::new(),
            compression: None,
        }
    }

    /// Attaches tags, dropping empty labels and duplicates.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags
            .into_iter()
            .map(Into::into)
            .filter(|tag: &String| !tag.is_empty())
            .collect();
        self
    }

    /// Attaches headers to replay on a hit.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Marks the payload as encoded with `algorithm`.
    pub fn with_compression(mut self, algorithm: Option<CompressionAlgorithm>) -> Self {
        self.compression = algorithm;
        self
    }

    // == Size ==
    /// Returns the number of stored payload bytes charged against the budget.
    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    // == Decoded Payload ==
    /// Returns the payload in its servable form.
    pub fn decoded_payload(&self) -> std::io::Result<Vec<u8>> {
        match self.compression {
            Some(algorithm) => algorithm.decompress(&self.payload),
            None => Ok(self.payload.clone()),
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults() {
        let entry = CacheEntry::new(b"hello".to_vec());

        assert_eq!(entry.payload, b"hello");
        assert!(entry.tags.is_empty());
        assert!(entry.headers.is_empty());
        assert!(entry.compression.is_none());
        assert_eq!(entry.size_bytes(), 5);
    }

    #[test]
    fn test_entry_tags_are_deduplicated() {
        let entry = CacheEntry::new("x").with_tags(["users", "users", "", "orders"]);

        assert_eq!(entry.tags.len(), 2);
        assert!(entry.tags.contains("users"));
        assert!(entry.tags.contains("orders"));
    }

    #[test]
    fn test_decoded_payload_uncompressed() {
        let entry = CacheEntry::new("plain");
        assert_eq!(entry.decoded_payload().unwrap(), b"plain");
    }

    #[test]
    fn test_decoded_payload_gzip() {
        let raw = b"a body that gets compressed".repeat(20);
        let stored = CompressionAlgorithm::Gzip.compress(&raw).unwrap();
        let entry = CacheEntry::new(stored).with_compression(Some(CompressionAlgorithm::Gzip));

        assert!(entry.size_bytes() < raw.len() as u64);
        assert_eq!(entry.decoded_payload().unwrap(), raw);
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let a = current_timestamp_ms();
        let b = current_timestamp_ms();
        assert!(b >= a);
    }
}
