//! Cache Metrics Module
//!
//! Counters for hits, misses, occupancy and evictions, plus the tag index
//! used for group invalidation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Maps a tag to the set of keys that currently carry it.
pub type TagIndex = HashMap<String, HashSet<String>>;

// == Cache Metrics ==
/// Thread-safe metrics recorder, one per cache instance.
///
/// Every counter is an independent atomic so recording a hit never contends
/// with admission bookkeeping. The tag index has its own mutex; callers that
/// need it consistent with entry metadata hold the controller's admission
/// lock while mutating it.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    current_size_bytes: AtomicU64,
    entry_count: AtomicU64,
    evicted_for_space: AtomicU64,
    evicted_for_removal: AtomicU64,
    evicted_by_store: AtomicU64,
    skipped_for_size: AtomicU64,
    tags: Mutex<TagIndex>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub current_size_bytes: u64,
    pub entry_count: u64,
    pub evicted_for_space: u64,
    pub evicted_for_removal: u64,
    pub evicted_by_store: u64,
    pub skipped_for_size: u64,
}

impl MetricsSnapshot {
    // == Hit Ratio ==
    /// Returns hits / (hits + misses), or 0.0 if nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl CacheMetrics {
    // == Constructor ==
    /// Creates a recorder with all counters at zero and an empty tag index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Lookups ==
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Size ==
    /// Grows the tracked size by the magnitude of `delta`.
    pub fn add_size(&self, delta: i64) {
        self.current_size_bytes
            .fetch_add(delta.unsigned_abs(), Ordering::AcqRel);
    }

    /// Shrinks the tracked size by the magnitude of `delta`, clamped at zero.
    pub fn subtract_size(&self, delta: i64) {
        let magnitude = delta.unsigned_abs();
        let _ = self
            .current_size_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(magnitude))
            });
    }

    pub fn current_size_bytes(&self) -> u64 {
        self.current_size_bytes.load(Ordering::Acquire)
    }

    // == Entry Count ==
    pub fn increment_entries(&self) {
        self.entry_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement_entries(&self) {
        let _ = self
            .entry_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            });
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Acquire)
    }

    // == Evictions ==
    pub fn record_evicted_for_space(&self) {
        self.evicted_for_space.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted_for_removal(&self) {
        self.evicted_for_removal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted_by_store(&self) {
        self.evicted_by_store.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_for_size(&self) {
        self.skipped_for_size.fetch_add(1, Ordering::Relaxed);
    }

    // == Tag Index ==
    fn tag_index(&self) -> MutexGuard<'_, TagIndex> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `key` under every tag in `tags`, creating sets as needed.
    pub fn add_tags<'a, I>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut index = self.tag_index();
        for tag in tags {
            index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Removes `key` from every tag in `tags`, pruning sets that become empty.
    pub fn remove_tags<'a, I>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut index = self.tag_index();
        for tag in tags {
            if let Some(keys) = index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(tag);
                }
            }
        }
    }

    /// Returns a snapshot of the keys carrying `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tag_index()
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops `tag` and whatever keys are still listed under it.
    pub fn remove_tag(&self, tag: &str) {
        self.tag_index().remove(tag);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_index().contains_key(tag)
    }

    /// Returns the number of keys per tag, ordered by tag.
    pub fn tag_counts(&self) -> BTreeMap<String, usize> {
        self.tag_index()
            .iter()
            .map(|(tag, keys)| (tag.clone(), keys.len()))
            .collect()
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            current_size_bytes: self.current_size_bytes(),
            entry_count: self.entry_count(),
            evicted_for_space: self.evicted_for_space.load(Ordering::Relaxed),
            evicted_for_removal: self.evicted_for_removal.load(Ordering::Relaxed),
            evicted_by_store: self.evicted_by_store.load(Ordering::Relaxed),
            skipped_for_size: self.skipped_for_size.load(Ordering::Relaxed),
        }
    }

    // == Clear ==
    /// Resets every counter and empties the tag index.
    ///
    /// Observers may see a partially reset state while this runs.
    pub fn clear(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.current_size_bytes,
            &self.entry_count,
            &self.evicted_for_space,
            &self.evicted_for_removal,
            &self.evicted_by_store,
            &self.skipped_for_size,
        ] {
            counter.store(0, Ordering::Release);
        }
        self.tag_index().clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_metrics_new() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert!(metrics.tag_counts().is_empty());
    }

    #[test]
    fn test_hit_ratio() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.snapshot().hit_ratio(), 0.0);

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert_eq!(metrics.snapshot().hit_ratio(), 0.75);
    }

    #[test]
    fn test_size_sign_is_normalized() {
        let metrics = CacheMetrics::new();
        metrics.add_size(100);
        metrics.add_size(-50);
        assert_eq!(metrics.current_size_bytes(), 150);

        metrics.subtract_size(-30);
        assert_eq!(metrics.current_size_bytes(), 120);
        metrics.subtract_size(20);
        assert_eq!(metrics.current_size_bytes(), 100);
    }

    #[test]
    fn test_size_clamps_at_zero() {
        let metrics = CacheMetrics::new();
        metrics.add_size(10);
        metrics.subtract_size(500);
        assert_eq!(metrics.current_size_bytes(), 0);

        metrics.decrement_entries();
        assert_eq!(metrics.entry_count(), 0);
    }

    #[test]
    fn test_tag_index_add_and_prune() {
        let metrics = CacheMetrics::new();
        let t = tags(&["users", "list"]);

        metrics.add_tags("/users", &t);
        metrics.add_tags("/users?page=2", &tags(&["users"]));

        let counts = metrics.tag_counts();
        assert_eq!(counts.get("users"), Some(&2));
        assert_eq!(counts.get("list"), Some(&1));

        metrics.remove_tags("/users", &t);
        assert!(!metrics.has_tag("list"));
        assert_eq!(metrics.keys_for_tag("users"), vec!["/users?page=2"]);

        metrics.remove_tags("/users?page=2", &tags(&["users"]));
        assert!(!metrics.has_tag("users"));
    }

    #[test]
    fn test_remove_unknown_tag_is_noop() {
        let metrics = CacheMetrics::new();
        metrics.remove_tags("k", &tags(&["missing"]));
        metrics.remove_tag("missing");
        assert!(metrics.keys_for_tag("missing").is_empty());
    }

    #[test]
    fn test_clear_resets_everything() {
        let metrics = CacheMetrics::new();
        metrics.record_hit();
        metrics.record_miss();
        metrics.add_size(42);
        metrics.increment_entries();
        metrics.record_evicted_for_space();
        metrics.record_evicted_for_removal();
        metrics.record_evicted_by_store();
        metrics.record_skipped_for_size();
        metrics.add_tags("k", &tags(&["t"]));

        metrics.clear();

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert!(!metrics.has_tag("t"));
    }
}
