// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{ProviderVerifier, TokenVerifier};
use crate::cache::{self, CacheProvider};
use crate::config::{ConfigError, GatewayConfig};
use crate::routing::{CachingUpstream, HttpUpstream, Upstream};
use crate::transform::{ClaimNormalizer, InternalTokenIssuer, TransformationStage};

/// Shared, immutable gateway components.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub transformer: Arc<TransformationStage>,
    pub cache: Arc<dyn CacheProvider>,
    /// Response-caching upstream used by the routing stage.
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    /// Assemble the gateway around the given collaborators.
    ///
    /// `upstream` is wrapped with the response cache.
    pub fn new(
        config: GatewayConfig,
        verifier: Arc<dyn TokenVerifier>,
        cache: Arc<dyn CacheProvider>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, ConfigError> {
        let issuer = InternalTokenIssuer::new(&config.internal_token)?;
        let transformer = TransformationStage::new(ClaimNormalizer::default(), Arc::new(issuer));
        let upstream = CachingUpstream::new(
            upstream,
            Arc::clone(&cache),
            config.routing.response_cache_ttl,
        );

        Ok(Self {
            config: Arc::new(config),
            verifier,
            transformer: Arc::new(transformer),
            cache,
            upstream: Arc::new(upstream),
        })
    }

    /// Build every component from configuration.
    pub fn from_config(
        config: GatewayConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let verifier = Arc::new(ProviderVerifier::from_config(&config.auth)?);
        let cache = cache::build(&config.cache, shutdown)?;
        let upstream = Arc::new(HttpUpstream::new(&config.routing)?);
        Self::new(config, verifier, cache, upstream)
    }
}
