//! Eviction Controller Module
//!
//! Admission under a byte budget, oldest-first space reclamation, key and tag
//! eviction, and reconciliation of removals the store performs on its own.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheMetrics, EntryTracker, MemoryStore, RemovalNotification};

// == Stored Entry ==
/// Value type placed in the store: an entry stamped with its admission
/// sequence so late notifications for a replaced value can be recognized.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub sequence: u64,
    pub entry: Arc<CacheEntry>,
}

pub type EntryStore = MemoryStore<StoredEntry>;

// == Admission Outcome ==
/// Why an entry was not admitted. The caller proceeds uncached either way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The payload alone exceeds the budget
    #[error("entry of {size} bytes exceeds the {budget} byte budget")]
    TooLarge { size: u64, budget: u64 },

    /// Reclamation ran out of candidates before freeing enough room
    #[error("needed {needed} bytes but only {freed} could be reclaimed")]
    InsufficientSpace { needed: u64, freed: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

fn signed(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

// == Eviction Controller ==
/// Keeps the store, entry metadata and tag index consistent under a global
/// byte budget.
///
/// The `tracker` mutex is the admission lock. Every path that mutates entry
/// metadata or the tag index holds it, including reconciliation of store
/// notifications. Counters live in [`CacheMetrics`] and are updated without it.
#[derive(Debug)]
pub struct EvictionController {
    store: Arc<EntryStore>,
    metrics: Arc<CacheMetrics>,
    tracker: Mutex<EntryTracker>,
    budget_bytes: u64,
}

impl EvictionController {
    // == Constructor ==
    pub fn new(store: Arc<EntryStore>, metrics: Arc<CacheMetrics>, budget_bytes: u64) -> Self {
        Self {
            store,
            metrics,
            tracker: Mutex::new(EntryTracker::new()),
            budget_bytes,
        }
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Number of keys with live metadata.
    pub async fn tracked_len(&self) -> usize {
        self.tracker.lock().await.len()
    }

    // == Lookup ==
    /// Returns the cached entry for `key`, recording a hit or a miss.
    pub async fn lookup(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.store.get(key).await {
            Some(stored) => {
                self.metrics.record_hit();
                Some(stored.entry)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    // == Admit ==
    /// Admits `entry` under `key`, reclaiming the oldest entries if the
    /// budget would otherwise be exceeded.
    ///
    /// Admission is always serialized on the admission lock, even when the
    /// entry fits without reclamation: a key that is already tracked must
    /// release its previous accounting first, and the budget is re-checked
    /// under the lock. The unlocked check only reports that reclamation is
    /// likely.
    pub async fn admit(&self, key: String, entry: CacheEntry, ttl: Option<Duration>) -> Admission {
        let size = entry.size_bytes();

        if size > self.budget_bytes {
            self.metrics.record_skipped_for_size();
            warn!(
                key = %key,
                size,
                budget = self.budget_bytes,
                "entry exceeds cache budget, not caching"
            );
            return Admission::Rejected(Rejection::TooLarge {
                size,
                budget: self.budget_bytes,
            });
        }

        let fits = |current: u64| current.saturating_add(size) <= self.budget_bytes;
        if !fits(self.metrics.current_size_bytes()) {
            debug!(key = %key, size, "budget exhausted, admission needs reclamation");
        }

        let mut tracker = self.tracker.lock().await;

        // A previous admission of the same key no longer counts toward the budget.
        let replaced = match tracker.remove(&key) {
            Some(previous) => {
                self.release(&key, previous.size_bytes, &previous.tags);
                true
            }
            None => false,
        };

        // Re-check under the lock: concurrent admissions may have moved the total.
        let current = self.metrics.current_size_bytes();
        if !fits(current) {
            let needed = current.saturating_add(size) - self.budget_bytes;
            let freed = self.reclaim(&mut tracker, needed).await;
            if freed < needed {
                if replaced {
                    self.store.remove(&key).await;
                }
                warn!(key = %key, needed, freed, "could not reclaim enough space, not caching");
                return Admission::Rejected(Rejection::InsufficientSpace { needed, freed });
            }
        }

        let tags: Vec<String> = entry.tags.iter().cloned().collect();
        let sequence = tracker.insert(&key, size, tags);
        self.metrics.add_tags(&key, &entry.tags);
        self.metrics.add_size(signed(size));
        self.metrics.increment_entries();

        let stored = StoredEntry {
            sequence,
            entry: Arc::new(entry),
        };
        self.store.set(key.clone(), stored, size, ttl).await;

        debug!(key = %key, size, sequence, "admitted entry");
        Admission::Admitted
    }

    // == Reclaim ==
    /// Evicts tracked entries oldest first until `needed` bytes are freed or
    /// candidates run out. Returns the bytes freed.
    async fn reclaim(&self, tracker: &mut EntryTracker, needed: u64) -> u64 {
        let mut freed = 0u64;
        let mut evicted = 0usize;

        for key in tracker.oldest_first() {
            if freed >= needed {
                break;
            }
            let Some(metadata) = tracker.remove(&key) else {
                continue;
            };
            self.release(&key, metadata.size_bytes, &metadata.tags);
            freed += metadata.size_bytes;

            // Already gone from the store means its notification is still in flight.
            if self.store.remove(&key).await.is_some() {
                self.metrics.record_evicted_for_space();
                evicted += 1;
            }
        }

        info!(needed, freed, evicted, "reclaimed cache space");
        freed
    }

    /// Undoes the size, count and tag bookkeeping of one admission.
    fn release(&self, key: &str, size_bytes: u64, tags: &[String]) {
        self.metrics.subtract_size(signed(size_bytes));
        self.metrics.decrement_entries();
        self.metrics.remove_tags(key, tags);
    }

    // == Evict By Key ==
    /// Removes `key`. Returns 1 if anything was removed, 0 otherwise.
    pub async fn evict_by_key(&self, key: &str) -> usize {
        let mut tracker = self.tracker.lock().await;
        self.evict_locked(&mut tracker, key).await
    }

    async fn evict_locked(&self, tracker: &mut EntryTracker, key: &str) -> usize {
        let metadata = tracker.remove(key);
        if let Some(metadata) = &metadata {
            self.release(key, metadata.size_bytes, &metadata.tags);
        }

        let removed = self.store.remove(key).await;
        if metadata.is_none() {
            if let Some(stored) = &removed {
                // Untracked value in a shared store; only its tags can dangle.
                self.metrics.remove_tags(key, &stored.entry.tags);
            }
        }

        if metadata.is_some() || removed.is_some() {
            self.metrics.record_evicted_for_removal();
            debug!(key = %key, "evicted entry");
            1
        } else {
            0
        }
    }

    // == Evict By Tag ==
    /// Removes every key carrying `tag`. Returns how many were removed.
    pub async fn evict_by_tag(&self, tag: &str) -> usize {
        let mut tracker = self.tracker.lock().await;

        let keys = self.metrics.keys_for_tag(tag);
        let mut removed = 0;
        for key in &keys {
            removed += self.evict_locked(&mut tracker, key).await;
        }
        self.metrics.remove_tag(tag);

        info!(tag = %tag, removed, "evicted entries by tag");
        removed
    }

    // == On Store Evicted ==
    /// Reconciles a removal the store reports.
    ///
    /// Only the admission named by the notification's sequence is released,
    /// so removals this controller already accounted for are no-ops. Returns
    /// true if any bookkeeping changed.
    pub async fn on_store_evicted(&self, notification: RemovalNotification<StoredEntry>) -> bool {
        let RemovalNotification { key, value, reason } = notification;
        let mut tracker = self.tracker.lock().await;

        match tracker.remove_if_sequence(&key, value.sequence) {
            Some(metadata) => {
                self.release(&key, metadata.size_bytes, &metadata.tags);
                self.metrics.record_evicted_by_store();
                debug!(key = %key, ?reason, "reconciled store eviction");
                true
            }
            None => {
                debug!(key = %key, ?reason, "store eviction already accounted for");
                false
            }
        }
    }

    // == Flush ==
    /// Removes every entry and resets all metrics. Returns how many entries
    /// the store dropped.
    pub async fn flush(&self) -> usize {
        let mut tracker = self.tracker.lock().await;
        tracker.clear();
        self.metrics.clear();
        let removed = self.store.clear().await;
        info!(removed, "flushed cache");
        removed
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RemovalReason, RemovalReceiver};

    fn controller(budget: u64) -> (EvictionController, RemovalReceiver<StoredEntry>) {
        let (store, rx) = EntryStore::new(budget * 4);
        let controller = EvictionController::new(Arc::new(store), Arc::new(CacheMetrics::new()), budget);
        (controller, rx)
    }

    fn sized(size: usize, tags: &[&str]) -> CacheEntry {
        CacheEntry::new(vec![b'x'; size]).with_tags(tags.iter().copied())
    }

    async fn deliver(controller: &EvictionController, rx: &mut RemovalReceiver<StoredEntry>) -> usize {
        let mut changed = 0;
        while let Ok(notification) = rx.try_recv() {
            if controller.on_store_evicted(notification).await {
                changed += 1;
            }
        }
        changed
    }

    #[tokio::test]
    async fn test_admit_within_budget() {
        let (controller, _rx) = controller(1000);

        assert!(controller.admit("a".into(), sized(300, &[]), None).await.is_admitted());
        assert!(controller.admit("b".into(), sized(700, &[]), None).await.is_admitted());

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.current_size_bytes, 1000);
        assert_eq!(snapshot.entry_count, 2);
        assert_eq!(snapshot.evicted_for_space, 0);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_rejected() {
        let (controller, _rx) = controller(100);

        let outcome = controller.admit("big".into(), sized(101, &["t"]), None).await;

        assert_eq!(
            outcome,
            Admission::Rejected(Rejection::TooLarge { size: 101, budget: 100 })
        );
        assert!(!controller.store().contains("big").await);
        assert_eq!(controller.metrics().snapshot().skipped_for_size, 1);
        assert!(!controller.metrics().has_tag("t"));
    }

    #[tokio::test]
    async fn test_reclaim_evicts_oldest_first() {
        let (controller, mut rx) = controller(1000);

        controller.admit("A".into(), sized(400, &["x"]), None).await;
        controller.admit("B".into(), sized(400, &["y"]), None).await;
        let outcome = controller.admit("C".into(), sized(400, &[]), None).await;

        assert!(outcome.is_admitted());
        assert!(!controller.store().contains("A").await);
        assert!(controller.store().contains("B").await);
        assert!(controller.store().contains("C").await);

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.current_size_bytes, 800);
        assert_eq!(snapshot.evicted_for_space, 1);
        assert!(!controller.metrics().has_tag("x"));

        // The store's notification for A must not be counted twice.
        assert_eq!(deliver(&controller, &mut rx).await, 0);
        assert_eq!(controller.metrics().current_size_bytes(), 800);

        assert_eq!(controller.evict_by_tag("y").await, 1);
        assert_eq!(controller.metrics().current_size_bytes(), 400);
    }

    #[tokio::test]
    async fn test_reclaim_takes_as_many_as_needed() {
        let (controller, _rx) = controller(100);

        for key in ["a", "b", "c", "d"] {
            controller.admit(key.into(), sized(25, &[]), None).await;
        }
        controller.admit("big".into(), sized(60, &[]), None).await;

        assert!(!controller.store().contains("a").await);
        assert!(!controller.store().contains("b").await);
        assert!(!controller.store().contains("c").await);
        assert!(controller.store().contains("d").await);
        assert_eq!(controller.metrics().current_size_bytes(), 85);
        assert_eq!(controller.metrics().snapshot().evicted_for_space, 3);
    }

    #[tokio::test]
    async fn test_readmitting_key_replaces_accounting() {
        let (controller, mut rx) = controller(1000);

        controller.admit("k".into(), sized(300, &["old"]), None).await;
        controller.admit("k".into(), sized(500, &["new"]), None).await;

        // Replaced notification for the first admission is stale.
        assert_eq!(deliver(&controller, &mut rx).await, 0);

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.current_size_bytes, 500);
        assert_eq!(snapshot.entry_count, 1);
        assert!(!controller.metrics().has_tag("old"));
        assert_eq!(controller.metrics().keys_for_tag("new"), vec!["k"]);
    }

    #[tokio::test]
    async fn test_evict_by_key_is_idempotent() {
        let (controller, mut rx) = controller(1000);
        controller.admit("k".into(), sized(100, &["t"]), None).await;

        assert_eq!(controller.evict_by_key("k").await, 1);
        assert_eq!(controller.evict_by_key("k").await, 0);
        assert_eq!(deliver(&controller, &mut rx).await, 0);

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.current_size_bytes, 0);
        assert_eq!(snapshot.entry_count, 0);
        assert_eq!(snapshot.evicted_for_removal, 1);
        assert!(!controller.metrics().has_tag("t"));
    }

    #[tokio::test]
    async fn test_evict_by_tag_removes_all_keys() {
        let (controller, _rx) = controller(1000);
        controller.admit("a".into(), sized(10, &["users", "list"]), None).await;
        controller.admit("b".into(), sized(10, &["users"]), None).await;
        controller.admit("c".into(), sized(10, &["orders"]), None).await;

        assert_eq!(controller.evict_by_tag("users").await, 2);

        assert!(!controller.metrics().has_tag("users"));
        assert!(!controller.metrics().has_tag("list"));
        assert!(controller.metrics().has_tag("orders"));
        assert_eq!(controller.metrics().current_size_bytes(), 10);
        assert_eq!(controller.evict_by_tag("users").await, 0);
        assert_eq!(controller.evict_by_tag("never-used").await, 0);
    }

    #[tokio::test]
    async fn test_store_expiry_is_reconciled() {
        let (controller, mut rx) = controller(1000);
        controller
            .admit("short".into(), sized(100, &["t"]), Some(Duration::ZERO))
            .await;
        controller.admit("long".into(), sized(50, &[]), None).await;

        assert_eq!(controller.store().cleanup_expired().await, 1);
        assert_eq!(deliver(&controller, &mut rx).await, 1);

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.current_size_bytes, 50);
        assert_eq!(snapshot.entry_count, 1);
        assert_eq!(snapshot.evicted_by_store, 1);
        assert!(!controller.metrics().has_tag("t"));
        assert_eq!(controller.tracked_len().await, 1);
    }

    #[tokio::test]
    async fn test_reclaim_releases_entries_already_gone_from_store() {
        let (controller, mut rx) = controller(100);
        controller
            .admit("stale".into(), sized(60, &[]), Some(Duration::ZERO))
            .await;
        controller.store().cleanup_expired().await;

        // Notification not yet delivered; reclamation still frees the bytes.
        let outcome = controller.admit("fresh".into(), sized(60, &[]), None).await;
        assert!(outcome.is_admitted());
        assert_eq!(controller.metrics().current_size_bytes(), 60);
        assert_eq!(controller.metrics().snapshot().evicted_for_space, 0);

        assert_eq!(deliver(&controller, &mut rx).await, 0);
        assert_eq!(controller.metrics().current_size_bytes(), 60);
    }

    #[tokio::test]
    async fn test_insufficient_space_when_untracked_bytes_remain() {
        let (controller, _rx) = controller(100);
        // Bytes charged outside of any tracked admission cannot be reclaimed.
        controller.metrics().add_size(90);

        let outcome = controller.admit("k".into(), sized(20, &[]), None).await;

        assert_eq!(
            outcome,
            Admission::Rejected(Rejection::InsufficientSpace { needed: 10, freed: 0 })
        );
        assert!(!controller.store().contains("k").await);
    }

    #[tokio::test]
    async fn test_lookup_records_hits_and_misses() {
        let (controller, _rx) = controller(1000);
        controller.admit("k".into(), sized(10, &[]), None).await;

        assert!(controller.lookup("k").await.is_some());
        assert!(controller.lookup("missing").await.is_none());

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
    }

    #[tokio::test]
    async fn test_flush_resets_everything() {
        let (controller, mut rx) = controller(1000);
        controller.admit("a".into(), sized(10, &["t"]), None).await;
        controller.admit("b".into(), sized(10, &[]), None).await;
        controller.lookup("a").await;

        assert_eq!(controller.flush().await, 2);
        assert_eq!(deliver(&controller, &mut rx).await, 0);

        assert_eq!(controller.metrics().snapshot(), Default::default());
        assert!(controller.metrics().tag_counts().is_empty());
        assert!(controller.store().is_empty().await);
        assert_eq!(controller.tracked_len().await, 0);
    }

    #[tokio::test]
    async fn test_store_capacity_eviction_is_reconciled() {
        // Store smaller than the budget: the store evicts on its own.
        let (store, mut rx) = EntryStore::new(100);
        let controller = EvictionController::new(Arc::new(store), Arc::new(CacheMetrics::new()), 1000);

        controller.admit("a".into(), sized(60, &["t"]), None).await;
        controller.admit("b".into(), sized(60, &[]), None).await;

        let notes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].reason, RemovalReason::Capacity);
        for note in notes {
            assert!(controller.on_store_evicted(note).await);
        }

        assert_eq!(controller.metrics().current_size_bytes(), 60);
        assert!(!controller.metrics().has_tag("t"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_stay_within_budget() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        const BUDGET: u64 = 1_000;
        const WORKERS: u64 = 8;
        const ROUNDS: u64 = 200;
        const TAGS: [&str; 3] = ["red", "green", "blue"];

        let (store, removals) = EntryStore::new(BUDGET * 10);
        let controller = Arc::new(EvictionController::new(
            Arc::new(store),
            Arc::new(CacheMetrics::new()),
            BUDGET,
        ));
        let listener = crate::tasks::spawn_eviction_listener(controller.clone(), removals);

        let done = Arc::new(AtomicBool::new(false));
        let peak = Arc::new(AtomicU64::new(0));
        let monitor = {
            let controller = controller.clone();
            let done = done.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                while !done.load(Ordering::Acquire) {
                    peak.fetch_max(controller.metrics().current_size_bytes(), Ordering::AcqRel);
                    tokio::task::yield_now().await;
                }
            })
        };

        let workers: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let controller = controller.clone();
                tokio::spawn(async move {
                    for round in 0..ROUNDS {
                        let key = format!("k{}", (round * 7 + worker) % 16);
                        let tag = TAGS[((round + worker) % 3) as usize];
                        match (round + worker) % 6 {
                            0..=2 => {
                                let size = 50 + (round * 13 + worker * 31) % 300;
                                controller.admit(key, sized(size as usize, &[tag]), None).await;
                            }
                            3 => {
                                controller.evict_by_key(&key).await;
                            }
                            4 => {
                                controller.evict_by_tag(tag).await;
                            }
                            _ => {
                                // Removal behind the controller's back.
                                controller.store().remove(&key).await;
                            }
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.await.unwrap();
        }
        done.store(true, Ordering::Release);
        monitor.await.unwrap();

        assert!(peak.load(Ordering::Acquire) <= BUDGET);

        // Let the listener drain the remaining notifications.
        let settled = |controller: Arc<EvictionController>| async move {
            let store = controller.store();
            controller.metrics().current_size_bytes() == store.total_weight().await
                && controller.metrics().entry_count() == store.len().await as u64
                && controller.tracked_len().await == store.len().await
        };
        for _ in 0..200 {
            if settled(controller.clone()).await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let store = controller.store();
        assert_eq!(controller.metrics().current_size_bytes(), store.total_weight().await);
        assert_eq!(controller.metrics().entry_count(), store.len().await as u64);
        assert_eq!(controller.tracked_len().await, store.len().await);
        assert!(controller.metrics().current_size_bytes() <= BUDGET);
        for (tag, count) in controller.metrics().tag_counts() {
            assert!(count > 0, "empty tag {} left in index", tag);
        }

        listener.abort();
    }
}
