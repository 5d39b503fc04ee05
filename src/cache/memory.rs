// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process LRU cache.
//!
//! Keys are spread over independently locked shards so concurrent requests
//! rarely contend on the same mutex.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::{CacheError, CacheProvider};

const SHARDS: usize = 16;

/// Cached value + expiry.
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Sharded LRU cache with per-entry TTL.
pub struct MemoryCache {
    shards: Vec<Mutex<LruCache<String, CacheEntry>>>,
}

impl MemoryCache {
    /// Create a cache holding roughly `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let per_shard = NonZeroUsize::new(capacity.div_ceil(SHARDS)).unwrap_or(NonZeroUsize::MIN);
        Self {
            shards: (0..SHARDS)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<LruCache<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    /// Return the value for `key` if present and not expired.
    pub fn lookup(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut shard = self.shard(key).lock().map_err(|_| CacheError::Poisoned)?;
        if let Some(entry) = shard.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            // Expired
            shard.pop(key);
        }
        Ok(None)
    }

    pub fn store(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut shard = self.shard(key).lock().map_err(|_| CacheError::Poisoned)?;
        if ttl.is_zero() {
            shard.pop(key);
            return Ok(());
        }
        shard.put(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut shard = self.shard(key).lock().map_err(|_| CacheError::Poisoned)?;
        shard.pop(key);
        Ok(())
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.lookup(key)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.store(key, value, ttl)
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
