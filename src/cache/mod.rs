//! Cache Module
//!
//! Byte-budgeted response cache: entry model, metrics and tag index, entry
//! tracking, the eviction controller, key derivation and the backing store.

mod compression;
mod controller;
mod entry;
mod key;
mod metrics;
mod store;
mod tracker;


// Re-export public types
pub use compression::{maybe_compress, parse_algorithm, CompressionAlgorithm};
pub use controller::{Admission, EntryStore, EvictionController, Rejection, StoredEntry};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::{KeyGenerator, RequestIdentity};
pub use metrics::{CacheMetrics, MetricsSnapshot, TagIndex};
pub use store::{MemoryStore, RemovalNotification, RemovalReason, RemovalReceiver};
pub use tracker::{EntryMetadata, EntryTracker};

// == Public Constants ==
/// Largest request body buffered for key derivation
pub const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024; // 16 MB

/// Response header a handler uses to tag its output
pub const CACHE_TAGS_HEADER: &str = "x-cache-tags";

/// Response header reporting HIT or MISS
pub const CACHE_STATUS_HEADER: &str = "x-cache";
