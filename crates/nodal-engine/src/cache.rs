//! Content-addressed compute cache.
//!
//! Maps a [`Fingerprint`] to the output set a node evaluation produced.
//! Entries are inserted after successful evaluations, looked up before every
//! attempt, and dropped wholesale by `clear()` (e.g. when the geometry
//! backend restarts and old handles become meaningless). No partial
//! invalidation exists because fingerprints already change whenever any
//! contributing value changes.
//!
//! Two implementations behind the same contract: [`InMemoryCache`]
//! (unbounded, concurrent) and [`LruComputeCache`] (capacity-bounded for
//! long-running sessions).

use std::sync::Mutex;

use dashmap::DashMap;
use indexmap::IndexMap;
use nodal_core::ValueMap;

use crate::fingerprint::Fingerprint;

/// Memoization store for node evaluation results.
///
/// Implementations must make concurrent `get`/`insert` from parallel sibling
/// evaluations safe (atomic per key); cross-entry transactional consistency
/// is not required.
pub trait ComputeCache: Send + Sync {
    /// Returns the cached outputs for a fingerprint, if present.
    fn get(&self, fingerprint: &Fingerprint) -> Option<ValueMap>;

    /// Stores the outputs for a fingerprint, replacing any existing entry.
    fn insert(&self, fingerprint: Fingerprint, outputs: ValueMap);

    /// Drops all entries.
    fn clear(&self);

    /// Number of entries currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded concurrent cache backed by `DashMap`.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<Fingerprint, ValueMap>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeCache for InMemoryCache {
    fn get(&self, fingerprint: &Fingerprint) -> Option<ValueMap> {
        self.entries.get(fingerprint).map(|v| v.clone())
    }

    fn insert(&self, fingerprint: Fingerprint, outputs: ValueMap) {
        self.entries.insert(fingerprint, outputs);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Capacity-bounded cache with least-recently-used eviction.
///
/// Recency order is kept in an `IndexMap`: a `get` re-inserts the entry at
/// the back, and inserts beyond capacity evict from the front. Lookups are
/// O(n) in the worst case due to the reorder; for the entry counts a
/// modeling session produces this is dwarfed by the evaluations being saved.
#[derive(Debug)]
pub struct LruComputeCache {
    capacity: usize,
    entries: Mutex<IndexMap<Fingerprint, ValueMap>>,
}

impl LruComputeCache {
    /// Creates a cache holding at most `capacity` entries.
    /// A capacity of 0 disables storage entirely.
    pub fn new(capacity: usize) -> Self {
        LruComputeCache {
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }
}

impl ComputeCache for LruComputeCache {
    fn get(&self, fingerprint: &Fingerprint) -> Option<ValueMap> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        // Re-insert at the back to mark as most recently used.
        let outputs = entries.shift_remove(fingerprint)?;
        entries.insert(*fingerprint, outputs.clone());
        Some(outputs)
    }

    fn insert(&self, fingerprint: Fingerprint, outputs: ValueMap) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.shift_remove(&fingerprint);
        entries.insert(fingerprint, outputs);
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}
