// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Response Cache
//!
//! One [`CacheProvider`] is selected at startup and shared by every request:
//!
//! - [`MemoryCache`]: sharded in-process LRU, single instance only
//! - [`RedisCache`]: Redis-backed, shared across instances, with a local
//!   near-cache kept coherent over a pub/sub invalidation channel
//!
//! Cache failures never fail a request; callers treat them as misses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{CacheProviderKind, CacheSettings, ConfigError};

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Cache backend failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache operation timed out")]
    Timeout,

    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cache lock poisoned")]
    Poisoned,
}

/// Key/value store for cached responses.
///
/// Implementations are shared across requests and must be safe for concurrent
/// use. A zero TTL means the value is not stored.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Backend reachability, for readiness probes.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short label for logs and health output.
    fn name(&self) -> &'static str;
}

/// Build the configured cache provider.
///
/// The distributed provider starts its invalidation listener, which stops
/// when `shutdown` is cancelled.
pub fn build(
    settings: &CacheSettings,
    shutdown: CancellationToken,
) -> Result<Arc<dyn CacheProvider>, ConfigError> {
    match settings.provider {
        CacheProviderKind::Memory => {
            tracing::info!(capacity = settings.capacity, "Using in-memory response cache");
            Ok(Arc::new(MemoryCache::new(settings.capacity)))
        }
        CacheProviderKind::Distributed => {
            let cache = Arc::new(RedisCache::new(&settings.redis, settings.capacity).map_err(
                |e| ConfigError::Invalid {
                    var: "REDIS_CONNECTION_STRING",
                    value: settings.redis.url.to_string(),
                    reason: e.to_string(),
                },
            )?);
            cache.spawn_backplane(shutdown);
            tracing::info!(
                redis = %settings.redis.url,
                instance_name = %settings.redis.instance_name,
                "Using distributed response cache"
            );
            Ok(cache)
        }
    }
}
