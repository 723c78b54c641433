//! Request DTOs for the cache server API
//!
//! Query structures for the admin endpoints and the cache directives parsed
//! from an ordinary request's query string.

use std::time::Duration;

use serde::Deserialize;

use crate::config::ControlParams;

/// Query for the single-key eviction endpoint (DELETE /cache/key)
#[derive(Debug, Clone, Deserialize)]
pub struct EvictKeyQuery {
    /// The exact cache key to evict
    pub key: String,
}

impl EvictKeyQuery {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        None
    }
}

// == Cache Directives ==
/// What a request asked of the cache through its control parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    /// Explicit use-cache flag, None = server default
    pub use_cache: Option<bool>,
    /// Evict before handling
    pub evict: bool,
    /// Tags to evict instead of the request's own key
    pub tags: Vec<String>,
    /// Summed duration override, None = server default
    pub ttl: Option<Duration>,
}

/// Longest cache duration a request may ask for (one year).
pub const MAX_DIRECTIVE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CacheDirectives {
    /// Reads the directives out of decoded query pairs.
    ///
    /// Parameter names match case-insensitively. Unparseable flag or duration
    /// values are ignored. Repeated tag parameters accumulate. The summed
    /// duration is capped at [`MAX_DIRECTIVE_TTL_SECS`].
    pub fn from_query(query: &[(String, String)], params: &ControlParams) -> Self {
        let mut directives = Self::default();
        let mut seconds: Option<u64> = None;
        let mut add_seconds = |amount: u64| {
            seconds = Some(seconds.unwrap_or(0).saturating_add(amount));
        };

        for (name, value) in query {
            let is = |param: &str| name.eq_ignore_ascii_case(param);

            if is(&params.use_cache) {
                if let Some(flag) = parse_flag(value) {
                    directives.use_cache = Some(flag);
                }
            } else if is(&params.evict) {
                directives.evict = parse_flag(value).unwrap_or(false);
            } else if is(&params.tags) {
                directives.tags.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|tag| !tag.is_empty())
                        .map(str::to_string),
                );
            } else if is(&params.seconds) {
                if let Ok(n) = value.trim().parse::<u64>() {
                    add_seconds(n);
                }
            } else if is(&params.minutes) {
                if let Ok(n) = value.trim().parse::<u64>() {
                    add_seconds(n.saturating_mul(60));
                }
            } else if is(&params.hours) {
                if let Ok(n) = value.trim().parse::<u64>() {
                    add_seconds(n.saturating_mul(3600));
                }
            }
        }

        directives.ttl = seconds.map(|secs| Duration::from_secs(secs.min(MAX_DIRECTIVE_TTL_SECS)));
        directives
    }
}
