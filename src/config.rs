//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use tracing::warn;

use crate::cache::{parse_algorithm, CompressionAlgorithm};

/// Names of the request-side query parameters that steer the cache.
///
/// None of these take part in key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlParams {
    /// Boolean: serve from and store into the cache
    pub use_cache: String,
    /// Boolean: evict before handling the request
    pub evict: String,
    /// Comma separated tags to scope eviction
    pub tags: String,
    /// Cache duration overrides, summed together
    pub seconds: String,
    pub minutes: String,
    pub hours: String,
}

impl ControlParams {
    /// Every reserved parameter name.
    pub fn names(&self) -> [&str; 6] {
        [
            self.use_cache.as_str(),
            self.evict.as_str(),
            self.tags.as_str(),
            self.seconds.as_str(),
            self.minutes.as_str(),
            self.hours.as_str(),
        ]
    }
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            use_cache: "useCache".to_string(),
            evict: "evict".to_string(),
            tags: "tags".to_string(),
            seconds: "cacheSeconds".to_string(),
            minutes: "cacheMinutes".to_string(),
            hours: "cacheHours".to_string(),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Global byte budget for cached payloads
    pub budget_bytes: u64,
    /// Weight capacity of the backing store
    pub store_capacity_bytes: u64,
    /// Default TTL in seconds when a request gives no duration
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Codec for stored payloads, None = store raw
    pub compression: Option<CompressionAlgorithm>,
    /// Payloads smaller than this are never compressed
    pub compression_min_bytes: usize,
    /// Whether requests use the cache when they do not say
    pub cache_by_default: bool,
    /// Response headers captured and replayed on a hit (lowercase)
    pub cached_headers: Vec<String>,
    /// Control parameter names
    pub params: ControlParams,
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Splits a comma separated list, trimming and lowercasing each item.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

const DEFAULT_BUDGET_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_CACHED_HEADERS: &str = "content-type,content-language,etag,last-modified";

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BUDGET_BYTES` - Byte budget (default: 64 MiB)
    /// - `STORE_CAPACITY_BYTES` - Store weight capacity (default: 2x budget)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `CACHE_COMPRESSION` - `none`, `gzip` or `deflate` (default: none)
    /// - `COMPRESSION_MIN_BYTES` - Compression threshold (default: 1024)
    /// - `CACHE_BY_DEFAULT` - Cache requests that do not opt in (default: true)
    /// - `CACHED_HEADERS` - Headers replayed on hits
    /// - `PARAM_USE_CACHE`, `PARAM_EVICT`, `PARAM_TAGS`, `PARAM_SECONDS`,
    ///   `PARAM_MINUTES`, `PARAM_HOURS` - Control parameter names
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let budget_bytes = env_parse("CACHE_BUDGET_BYTES").unwrap_or(defaults.budget_bytes);

        let compression = match env::var("CACHE_COMPRESSION") {
            Ok(value) => parse_algorithm(&value).unwrap_or_else(|err| {
                warn!("{}, storing payloads uncompressed", err);
                None
            }),
            Err(_) => defaults.compression,
        };

        let params = ControlParams {
            use_cache: env_string("PARAM_USE_CACHE", &defaults.params.use_cache),
            evict: env_string("PARAM_EVICT", &defaults.params.evict),
            tags: env_string("PARAM_TAGS", &defaults.params.tags),
            seconds: env_string("PARAM_SECONDS", &defaults.params.seconds),
            minutes: env_string("PARAM_MINUTES", &defaults.params.minutes),
            hours: env_string("PARAM_HOURS", &defaults.params.hours),
        };

        Self {
            budget_bytes,
            store_capacity_bytes: env_parse("STORE_CAPACITY_BYTES")
                .unwrap_or_else(|| budget_bytes.saturating_mul(2)),
            default_ttl: env_parse("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: env_parse("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: env_parse("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            compression,
            compression_min_bytes: env_parse("COMPRESSION_MIN_BYTES")
                .unwrap_or(defaults.compression_min_bytes),
            cache_by_default: env_parse("CACHE_BY_DEFAULT").unwrap_or(defaults.cache_by_default),
            cached_headers: split_list(&env_string("CACHED_HEADERS", DEFAULT_CACHED_HEADERS)),
            params,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            store_capacity_bytes: DEFAULT_BUDGET_BYTES * 2,
            default_ttl: 300,
            server_port: 3000,
            cleanup_interval: 1,
            compression: None,
            compression_min_bytes: 1024,
            cache_by_default: true,
            cached_headers: split_list(DEFAULT_CACHED_HEADERS),
            params: ControlParams::default(),
        }
    }
}
