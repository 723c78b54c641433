//! Cache Key Module
//!
//! Derives a deterministic cache key from request identity.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

// == Request Identity ==
/// The parts of a request that decide which cached artifact it maps to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdentity<'a> {
    /// Request path without the query string
    pub path: &'a str,
    /// Decoded query pairs in request order
    pub query: &'a [(String, String)],
    /// Raw body bytes, present for mutating requests
    pub body: Option<&'a [u8]>,
    /// Accept header, verbatim
    pub accept: Option<&'a str>,
}

// == Key Generator ==
/// Builds cache keys, skipping reserved control parameters.
///
/// Reserved names are matched case-insensitively so `?useCache=false` and
/// `?USECACHE=false` both leave the key unchanged.
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    reserved: HashSet<String>,
}

impl KeyGenerator {
    // == Constructor ==
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            reserved: reserved
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(&name.to_ascii_lowercase())
    }

    // == Generate ==
    /// Returns `path[?sorted-query][#body=<sha256>][#accept=<accept>]`.
    ///
    /// Query pairs are sorted by name then value and re-encoded, so input
    /// order never matters. The body digest covers the raw bytes: formatting
    /// differences in an otherwise equal body produce a different key.
    pub fn generate(&self, identity: &RequestIdentity<'_>) -> String {
        let mut key = identity.path.to_string();

        let mut params: Vec<(&str, &str)> = identity
            .query
            .iter()
            .filter(|(name, _)| !self.is_reserved(name))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        params.sort_unstable();

        if !params.is_empty() {
            // Encoding a list of string pairs cannot fail.
            let encoded = serde_urlencoded::to_string(&params).unwrap_or_default();
            key.push('?');
            key.push_str(&encoded);
        }

        if let Some(body) = identity.body {
            key.push_str("#body=");
            key.push_str(&hex::encode(Sha256::digest(body)));
        }

        if let Some(accept) = identity.accept {
            key.push_str("#accept=");
            key.push_str(accept);
        }

        key
    }
}
