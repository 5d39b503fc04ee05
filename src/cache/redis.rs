// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Redis-backed distributed cache.
//!
//! ## Behavior
//!
//! - Every key is prefixed with the configured instance name
//! - The connection is opened on first use; a failed connect is retried on
//!   the next call
//! - Each backend call is bounded by the operation timeout and retried with
//!   exponential backoff up to the retry limit
//! - Values are also kept in a local near-cache; writes and invalidations are
//!   published on `<instance name>invalidations` so other gateway nodes drop
//!   their stale near-cache entries

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::memory::MemoryCache;
use super::{CacheError, CacheProvider};
use crate::config::RedisSettings;

/// Upper bound on near-cache entry lifetime.
const NEAR_CACHE_MAX_TTL: Duration = Duration::from_secs(30);

/// Upper bound on a single retry backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Delay before resubscribing after the invalidation channel drops.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    settings: RedisSettings,
    near: MemoryCache,
    /// Identifies this node on the invalidation channel.
    node_id: String,
    channel: String,
}

impl RedisCache {
    /// Create the cache. No connection is opened until first use.
    pub fn new(settings: &RedisSettings, near_capacity: usize) -> RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(settings.url.as_str())?,
            connection: OnceCell::new(),
            settings: settings.clone(),
            near: MemoryCache::new(near_capacity),
            node_id: uuid::Uuid::new_v4().to_string(),
            channel: format!("{}invalidations", settings.instance_name),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.settings.instance_name, key)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let timeout = self.settings.operation_timeout;
        let client = self.client.clone();
        self.connection
            .get_or_try_init(|| async move {
                tokio::time::timeout(timeout, ConnectionManager::new(client))
                    .await
                    .map_err(|_| CacheError::Timeout)?
                    .map_err(CacheError::from)
            })
            .await
            .cloned()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.settings
            .retry_timeout
            .saturating_mul(factor)
            .min(MAX_BACKOFF)
    }

    /// Run `op` against the backend, bounded and retried.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, CacheError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match self.connection().await {
                Ok(conn) => match tokio::time::timeout(self.settings.operation_timeout, f(conn)).await {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(e)) => CacheError::from(e),
                    Err(_) => CacheError::Timeout,
                },
                Err(e) => e,
            };

            if attempt >= self.settings.max_retries {
                return Err(result);
            }
            attempt += 1;
            tracing::debug!(op, attempt, error = %result, "Retrying cache operation");
            tokio::time::sleep(self.backoff(attempt)).await;
        }
    }

    async fn publish_invalidation(&self, key: &str) {
        let channel = self.channel.clone();
        let message = encode_invalidation(&self.node_id, key);
        let result = self
            .with_retry("publish", |mut conn| {
                let cmd = redis::cmd("PUBLISH").arg(&channel).arg(&message).clone();
                async move {
                    let _receivers: i64 = cmd.query_async(&mut conn).await?;
                    Ok(())
                }
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to publish cache invalidation");
        }
    }

    /// Apply a message from the invalidation channel.
    ///
    /// Returns `true` when a near-cache entry was dropped. Messages published
    /// by this node are ignored.
    pub fn apply_invalidation(&self, payload: &str) -> bool {
        match decode_invalidation(payload) {
            Some((origin, key)) if origin != self.node_id => self.near.remove(key).is_ok(),
            _ => false,
        }
    }

    /// Listen for invalidations until `shutdown` is cancelled.
    pub fn spawn_backplane(self: &Arc<Self>, shutdown: CancellationToken) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = cache.listen() => {
                        if let Err(e) = result {
                            tracing::warn!(channel = %cache.channel, error = %e, "Cache invalidation channel lost");
                        }
                    }
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
                }
            }
            tracing::debug!("Cache invalidation listener stopped");
        });
    }

    async fn listen(&self) -> RedisResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "Subscribed to cache invalidations");

        let mut messages = std::pin::pin!(pubsub.on_message());
        while let Some(message) = messages.next().await {
            let payload: String = message.get_payload()?;
            self.apply_invalidation(&payload);
        }
        Ok(())
    }
}

fn encode_invalidation(node_id: &str, key: &str) -> String {
    format!("{node_id}\n{key}")
}

fn decode_invalidation(payload: &str) -> Option<(&str, &str)> {
    payload.split_once('\n')
}

#[async_trait]
impl CacheProvider for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(value) = self.near.lookup(key)? {
            return Ok(Some(value));
        }

        let namespaced = self.namespaced(key);
        let (value, ttl_ms) = self
            .with_retry("get", |mut conn| {
                let pipe = redis::pipe().get(&namespaced).pttl(&namespaced).clone();
                async move {
                    let result: (Option<Vec<u8>>, i64) = pipe.query_async(&mut conn).await?;
                    Ok(result)
                }
            })
            .await?;

        if let Some(value) = &value {
            if ttl_ms > 0 {
                let ttl = Duration::from_millis(ttl_ms as u64).min(NEAR_CACHE_MAX_TTL);
                self.near.store(key, value.clone(), ttl)?;
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = ttl.as_millis().min(u128::from(u64::MAX)) as u64;
        if ttl_ms == 0 {
            return self.invalidate(key).await;
        }

        self.near.store(key, value.clone(), ttl.min(NEAR_CACHE_MAX_TTL))?;

        let namespaced = self.namespaced(key);
        self.with_retry("set", |mut conn| {
            let cmd = redis::cmd("SET")
                .arg(&namespaced)
                .arg(value.as_slice())
                .arg("PX")
                .arg(ttl_ms)
                .clone();
            async move {
                let _: () = cmd.query_async(&mut conn).await?;
                Ok(())
            }
        })
        .await?;

        self.publish_invalidation(key).await;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.near.remove(key)?;

        let namespaced = self.namespaced(key);
        self.with_retry("del", |mut conn| {
            let cmd = redis::cmd("DEL").arg(&namespaced).clone();
            async move {
                let _removed: i64 = cmd.query_async(&mut conn).await?;
                Ok(())
            }
        })
        .await?;

        self.publish_invalidation(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.with_retry("ping", |mut conn| async move {
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "distributed"
    }
}
