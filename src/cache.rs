use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use serde::Serialize;

use crate::operation::Decision;
use crate::principal::PrincipalId;

/// Hit/miss counts observed since the cache was created.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Memoized (principal, path) decisions with least-recently-used
/// eviction under capacity pressure.
///
/// The cache belongs to one policy generation: the engine builds a
/// fresh cache with every published snapshot, and publishing the next
/// generation is the full invalidation. Concurrent resolutions
/// serialize on the inner mutex for both lookups and inserts.
#[derive(Debug)]
pub struct DecisionCache {
    entries: Mutex<LruCache<(PrincipalId, String), Decision>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Past decision for this principal and path, refreshing its
    /// recency on a hit.
    pub fn get(&self, principal: PrincipalId, path: &str) -> Option<Decision> {
        let decision = self
            .entries
            .lock()
            .unwrap()
            .get(&(principal, path.to_string()))
            .copied();
        match decision {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        decision
    }

    /// Remember a decision, evicting the least recently used entry if
    /// the cache is full.
    pub fn insert(&self, principal: PrincipalId, path: String, decision: Decision) {
        self.entries.lock().unwrap().put((principal, path), decision);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
