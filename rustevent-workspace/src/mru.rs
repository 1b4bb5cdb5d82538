//! Most-recently-used cache of materialized histograms.
//!
//! Entries are keyed by spectrum index and the exact bin edges they were
//! binned into, and stamped with the generation of the event list they came
//! from. A lookup against a newer generation is a miss and drops the stale
//! entry, so a mutation that slips past explicit invalidation can never be
//! served.
//!
//! The cache itself is not synchronized; the owning workspace wraps it in a
//! mutex held only for bookkeeping, never while binning.

use std::num::NonZeroUsize;

use lru::LruCache;
use rustevent_core::{BinEdges, Histogram};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of one cached histogram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Spectrum index within the owning workspace.
    pub index: usize,
    /// Edges the events were binned into.
    pub edges: BinEdges,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub fn new(index: usize, edges: BinEdges) -> Self {
        Self { index, edges }
    }
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    histogram: Histogram,
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required binning.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Entries dropped because their event list changed.
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache (0.0-1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded histogram cache with least-recently-used eviction.
#[derive(Debug)]
pub struct MruCache {
    entries: LruCache<CacheKey, Entry>,
    stats: CacheStats,
}

impl MruCache {
    /// Creates a cache holding at most `capacity` histograms (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(non_zero(capacity)),
            stats: CacheStats::default(),
        }
    }

    /// Cached histogram for `key` if it was binned from `generation`.
    ///
    /// A hit promotes the entry to most recently used. An entry from another
    /// generation is removed and counted as an invalidation.
    pub fn get(&mut self, key: &CacheKey, generation: u64) -> Option<Histogram> {
        let current = self.entries.get(key).map(|entry| entry.generation);
        match current {
            Some(cached) if cached == generation => {
                self.stats.hits += 1;
                self.entries.peek(key).map(|entry| entry.histogram.clone())
            }
            Some(_) => {
                self.entries.pop(key);
                self.stats.invalidations += 1;
                self.stats.misses += 1;
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Stores a histogram binned from `generation`, evicting the least
    /// recently used entry if full.
    pub fn insert(&mut self, key: CacheKey, generation: u64, histogram: Histogram) {
        let entry = Entry {
            generation,
            histogram,
        };
        if let Some((evicted, _)) = self.entries.push(key, entry) {
            // push also hands back the old value of a replaced key.
            if !self.entries.contains(&evicted) {
                self.stats.evictions += 1;
                log::trace!("evicted cached histogram for spectrum {}", evicted.index);
            }
        }
    }

    /// Drops every entry of spectrum `index`; returns how many were removed.
    pub fn invalidate(&mut self, index: usize) -> usize {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.index == index)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        self.stats.invalidations += stale.len() as u64;
        stale.len()
    }

    /// Drops every entry. Statistics are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached histograms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of cached histograms.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Changes the capacity, evicting least recently used entries if it
    /// shrinks.
    pub fn resize(&mut self, capacity: usize) {
        let before = self.entries.len();
        self.entries.resize(non_zero(capacity));
        let dropped = before.saturating_sub(self.entries.len());
        self.stats.evictions += dropped as u64;
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl Default for MruCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MRU_CAPACITY)
    }
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
