//! Memory Store Module
//!
//! Weight-bounded keyed store with TTL expiry and its own least-recently-used
//! eviction. Every removal is reported on a notification channel.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;

// == Removal Notifications ==
/// Why the store dropped a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// TTL elapsed
    Expired,
    /// Store weight capacity exceeded
    Capacity,
    /// Overwritten by a `set` on the same key
    Replaced,
    /// Removed through `remove` or `clear`
    Explicit,
}

/// Sent exactly once per value the store drops.
#[derive(Debug, Clone)]
pub struct RemovalNotification<V> {
    pub key: String,
    pub value: V,
    pub reason: RemovalReason,
}

pub type RemovalReceiver<V> = mpsc::UnboundedReceiver<RemovalNotification<V>>;

// == Slot ==
#[derive(Debug)]
struct Slot<V> {
    value: V,
    weight: u64,
    expires_at: Option<u64>,
    last_access: u64,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Absolute expiry in Unix milliseconds, or None when it lies beyond what a
/// `u64` timestamp can hold (the value then never expires).
fn expiry_from_now(now: u64, ttl: Duration) -> Option<u64> {
    u64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ms| now.checked_add(ms))
}

#[derive(Debug)]
struct StoreInner<V> {
    slots: HashMap<String, Slot<V>>,
    total_weight: u64,
    /// Logical access clock for recency ordering
    tick: u64,
}

impl<V> StoreInner<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn take(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.slots.remove(key)?;
        self.total_weight = self.total_weight.saturating_sub(slot.weight);
        Some(slot)
    }

    fn least_recent_key(&self) -> Option<String> {
        self.slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(key, _)| key.clone())
    }
}

// == Memory Store ==
/// In-process keyed store shared by one or more caches.
///
/// Notifications are queued on an unbounded channel and never delivered
/// while the store's lock is held, so listeners may call back into the store.
#[derive(Debug)]
pub struct MemoryStore<V> {
    inner: Mutex<StoreInner<V>>,
    capacity_weight: u64,
    notifier: mpsc::UnboundedSender<RemovalNotification<V>>,
}

impl<V: Clone + Send + 'static> MemoryStore<V> {
    // == Constructor ==
    /// Creates a store holding at most `capacity_weight` units of weight.
    ///
    /// Returns the receiving half of the removal notification channel.
    pub fn new(capacity_weight: u64) -> (Self, RemovalReceiver<V>) {
        let (notifier, receiver) = mpsc::unbounded_channel();
        let store = Self {
            inner: Mutex::new(StoreInner {
                slots: HashMap::new(),
                total_weight: 0,
                tick: 0,
            }),
            capacity_weight,
            notifier,
        };
        (store, receiver)
    }

    fn notify(&self, removed: Vec<(String, V, RemovalReason)>) {
        for (key, value, reason) in removed {
            debug!(key = %key, ?reason, "store removed entry");
            // A dropped receiver means nobody is listening.
            let _ = self.notifier.send(RemovalNotification { key, value, reason });
        }
    }

    // == Get ==
    /// Returns a clone of the live value for `key`, refreshing its recency.
    ///
    /// An expired value is dropped and reported instead.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut removed = Vec::new();
        let value = {
            let mut inner = self.inner.lock().await;
            let now = current_timestamp_ms();
            let expired = inner.slots.get(key).map(|slot| slot.is_expired(now))?;
            if expired {
                if let Some(slot) = inner.take(key) {
                    removed.push((key.to_string(), slot.value, RemovalReason::Expired));
                }
                None
            } else {
                let tick = inner.next_tick();
                inner.slots.get_mut(key).map(|slot| {
                    slot.last_access = tick;
                    slot.value.clone()
                })
            }
        };
        self.notify(removed);
        value
    }

    /// Returns true if a live value exists for `key`. Does not touch recency.
    pub async fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock().await;
        let now = current_timestamp_ms();
        inner
            .slots
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now))
    }

    // == Set ==
    /// Stores `value` under `key` with the given weight and optional TTL.
    ///
    /// Least-recently-used values are dropped until the new value fits. A
    /// value heavier than the whole store is dropped immediately.
    pub async fn set(&self, key: String, value: V, weight: u64, ttl: Option<Duration>) {
        let mut removed = Vec::new();
        {
            let mut inner = self.inner.lock().await;

            if let Some(previous) = inner.take(&key) {
                removed.push((key.clone(), previous.value, RemovalReason::Replaced));
            }

            if weight > self.capacity_weight {
                removed.push((key, value, RemovalReason::Capacity));
            } else {
                while inner.total_weight + weight > self.capacity_weight {
                    let Some(victim) = inner.least_recent_key() else {
                        break;
                    };
                    if let Some(slot) = inner.take(&victim) {
                        removed.push((victim, slot.value, RemovalReason::Capacity));
                    }
                }

                let expires_at = ttl.and_then(|ttl| expiry_from_now(current_timestamp_ms(), ttl));
                let tick = inner.next_tick();
                inner.total_weight += weight;
                inner.slots.insert(
                    key,
                    Slot {
                        value,
                        weight,
                        expires_at,
                        last_access: tick,
                    },
                );
            }
        }
        self.notify(removed);
    }

    // == Remove ==
    /// Removes `key`, returning its value if it was present.
    pub async fn remove(&self, key: &str) -> Option<V> {
        let slot = {
            let mut inner = self.inner.lock().await;
            inner.take(key)
        }?;
        let value = slot.value.clone();
        self.notify(vec![(key.to_string(), slot.value, RemovalReason::Explicit)]);
        Some(value)
    }

    // == Clear ==
    /// Removes every value. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let removed: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.total_weight = 0;
            inner
                .slots
                .drain()
                .map(|(key, slot)| (key, slot.value, RemovalReason::Explicit))
                .collect()
        };
        let count = removed.len();
        self.notify(removed);
        count
    }

    // == Cleanup Expired ==
    /// Drops every expired value. Returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let removed: Vec<_> = {
            let mut inner = self.inner.lock().await;
            let now = current_timestamp_ms();
            let expired_keys: Vec<String> = inner
                .slots
                .iter()
                .filter(|(_, slot)| slot.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();

            expired_keys
                .into_iter()
                .filter_map(|key| {
                    inner
                        .take(&key)
                        .map(|slot| (key, slot.value, RemovalReason::Expired))
                })
                .collect()
        };
        let count = removed.len();
        self.notify(removed);
        count
    }

    // == Length ==
    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.slots.is_empty()
    }

    pub async fn total_weight(&self) -> u64 {
        self.inner.lock().await.total_weight
    }
}
