//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::MetricsSnapshot;

/// Response body for every eviction endpoint, including flush
#[derive(Debug, Clone, Serialize)]
pub struct EvictResponse {
    /// Number of entries removed
    pub removed: usize,
}

impl EvictResponse {
    pub fn new(removed: usize) -> Self {
        Self { removed }
    }
}

/// Response body for the metrics endpoint (GET /cache/metrics)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 when nothing was looked up
    pub hit_ratio: f64,
    pub current_size_bytes: u64,
    pub budget_bytes: u64,
    pub entry_count: u64,
    pub evicted_for_space: u64,
    pub evicted_for_removal: u64,
    pub evicted_by_store: u64,
    pub skipped_for_size: u64,
    /// Number of keys per tag
    pub tags: BTreeMap<String, usize>,
}

impl MetricsResponse {
    /// Creates a new MetricsResponse from a counter snapshot and tag counts
    pub fn new(snapshot: MetricsSnapshot, budget_bytes: u64, tags: BTreeMap<String, usize>) -> Self {
        Self {
            hits: snapshot.hits,
            misses: snapshot.misses,
            hit_ratio: snapshot.hit_ratio(),
            current_size_bytes: snapshot.current_size_bytes,
            budget_bytes,
            entry_count: snapshot.entry_count,
            evicted_for_space: snapshot.evicted_for_space,
            evicted_for_removal: snapshot.evicted_for_removal,
            evicted_by_store: snapshot.evicted_by_store,
            skipped_for_size: snapshot.skipped_for_size,
            tags,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
