//! Entry Tracker Module
//!
//! Per-key size and creation-time records, kept independently of the
//! underlying store and ordered for space reclamation.

use std::collections::{BTreeMap, HashMap};

use crate::cache::entry::current_timestamp_ms;

// == Entry Metadata ==
/// Bookkeeping for one admitted key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Bytes charged against the budget
    pub size_bytes: u64,
    /// Admission timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Admission sequence number, unique per tracker
    pub sequence: u64,
    /// Tags the entry was registered under
    pub tags: Vec<String>,
}

// == Entry Tracker ==
/// Tracks admitted keys in creation order.
///
/// Candidates are ordered by `(created_at, sequence)` so entries admitted in
/// the same millisecond fall back to admission order.
#[derive(Debug, Default)]
pub struct EntryTracker {
    entries: HashMap<String, EntryMetadata>,
    order: BTreeMap<(u64, u64), String>,
    next_sequence: u64,
}

impl EntryTracker {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Records `key` as admitted now. Returns its sequence number.
    pub fn insert(&mut self, key: &str, size_bytes: u64, tags: Vec<String>) -> u64 {
        self.insert_at(key, size_bytes, current_timestamp_ms(), tags)
    }

    /// Records `key` with an explicit creation timestamp.
    ///
    /// An existing record for the same key is replaced.
    pub fn insert_at(
        &mut self,
        key: &str,
        size_bytes: u64,
        created_at: u64,
        tags: Vec<String>,
    ) -> u64 {
        self.remove(key);

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.order.insert((created_at, sequence), key.to_string());
        self.entries.insert(
            key.to_string(),
            EntryMetadata {
                size_bytes,
                created_at,
                sequence,
                tags,
            },
        );
        sequence
    }

    // == Remove ==
    /// Removes the record for `key`, returning it if one existed.
    pub fn remove(&mut self, key: &str) -> Option<EntryMetadata> {
        let metadata = self.entries.remove(key)?;
        self.order.remove(&(metadata.created_at, metadata.sequence));
        Some(metadata)
    }

    /// Removes the record for `key` only if it belongs to admission `sequence`.
    pub fn remove_if_sequence(&mut self, key: &str, sequence: u64) -> Option<EntryMetadata> {
        match self.entries.get(key) {
            Some(metadata) if metadata.sequence == sequence => self.remove(key),
            _ => None,
        }
    }

    // == Lookup ==
    pub fn get(&self, key: &str) -> Option<&EntryMetadata> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // == Oldest First ==
    /// Returns tracked keys ordered by creation time, oldest first.
    pub fn oldest_first(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    /// Sum of every tracked size.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|m| m.size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
