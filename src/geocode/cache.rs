// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for resolved place names.
//!
//! Unlike a single-TTL cache, every entry carries its own expiry: provider
//! answers live long, degraded placeholders expire quickly so the provider
//! is retried at a bounded rate.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::time::{Duration, Instant};

/// Whether an entry came from the provider or is a failure placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Success,
    Degraded,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
    freshness: Freshness,
}

/// Place-name cache keyed by canonical coordinates.
pub struct GeocodeCache {
    entries: LruCache<String, CacheEntry>,
}

impl GeocodeCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Live entry for `key`, evicting it if expired.
    pub fn get(&mut self, key: &str) -> Option<(String, Freshness)> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some((entry.value.clone(), entry.freshness));
            }
            // expired
            self.entries.pop(key);
        }
        None
    }

    pub fn put(&mut self, key: String, value: String, freshness: Freshness, ttl: Duration) {
        self.entries.put(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                freshness,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
