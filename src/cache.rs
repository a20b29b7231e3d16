//! Result cache for repeated filter and facet queries.
//!
//! Keys are canonical filter-state serializations, so the same selection
//! entered in a different order hits the same entry. Bounded by entry count
//! and by age (entries older than the TTL are recomputed on access).
//!
//! Eviction picks the least recently used entry, with recency measured in
//! whole seconds since the cache was created. Entries used within the same
//! second tie on recency; the one with fewer hits goes first, then the one
//! inserted or touched earliest.
//!
//! NOT synchronized -- the engine wraps it in a `Mutex`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use roaring::RoaringBitmap;

use crate::config::CacheConfig;
use crate::query::{FacetOption, FilterState};

/// Cache key for a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Positions(String),
    Options { column: String, state: String },
}

impl CacheKey {
    pub fn positions(state: &FilterState) -> Self {
        CacheKey::Positions(state.canonical_key())
    }

    pub fn options(column: &str, state: &FilterState) -> Self {
        CacheKey::Options {
            column: column.to_string(),
            state: state.canonical_key(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Positions(Arc<RoaringBitmap>),
    Options(Arc<Vec<FacetOption>>),
}

#[derive(Debug)]
struct CacheEntry {
    value: CachedValue,
    created_at: Instant,
    /// Whole seconds since the cache epoch at the last access.
    last_access: u64,
    hits: u64,
    /// Access sequence number; the final tie-break.
    seq: u64,
}

/// Counters reported by [`ResultCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
    epoch: Instant,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            capacity: config.capacity,
            ttl: config.ttl(),
            entries: HashMap::new(),
            epoch: Instant::now(),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    pub fn get_positions(&mut self, key: &CacheKey) -> Option<Arc<RoaringBitmap>> {
        match self.get_at(key, Instant::now())? {
            CachedValue::Positions(p) => Some(p),
            CachedValue::Options(_) => None,
        }
    }

    pub fn get_options(&mut self, key: &CacheKey) -> Option<Arc<Vec<FacetOption>>> {
        match self.get_at(key, Instant::now())? {
            CachedValue::Options(o) => Some(o),
            CachedValue::Positions(_) => None,
        }
    }

    pub fn put(&mut self, key: CacheKey, value: CachedValue) {
        self.put_at(key, value, Instant::now());
    }

    fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<CachedValue> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => now.saturating_duration_since(entry.created_at) > self.ttl,
        };
        if expired {
            self.entries.remove(key);
            self.expirations += 1;
            self.misses += 1;
            return None;
        }

        self.tick += 1;
        let seq = self.tick;
        let recency = self.recency(now);
        let entry = self.entries.get_mut(key)?;
        entry.last_access = recency;
        entry.seq = seq;
        entry.hits += 1;
        self.hits += 1;
        Some(entry.value.clone())
    }

    fn put_at(&mut self, key: CacheKey, value: CachedValue, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        self.tick += 1;
        let entry = CacheEntry {
            value,
            created_at: now,
            last_access: self.recency(now),
            hits: 0,
            seq: self.tick,
        };
        self.entries.insert(key.clone(), entry);
        while self.entries.len() > self.capacity {
            if !self.evict_one(&key) {
                break;
            }
        }
    }

    fn recency(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_secs()
    }

    /// Drop the least recently used entry other than `keep`; among equals,
    /// the least hit.
    fn evict_one(&mut self, keep: &CacheKey) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(k, _)| *k != keep)
            .min_by_key(|(_, e)| (e.last_access, e.hits, e.seq))
            .map(|(k, _)| k.clone());
        match victim {
            Some(key) => {
                self.entries.remove(&key);
                self.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// Drop every entry. Called whenever the dataset or an index changes.
    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(entries = self.entries.len(), "Invalidating result cache");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }
}
