// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{authenticate, AuthState},
    pipeline::{
        drop_unusable_correlation_id, health_short_circuit, identify_client, make_request_span,
        reject_disallowed_origin, tag_correlation, track_cache_state, OriginPolicy,
        X_CORRELATION_ID,
    },
    routing,
    state::AppState,
    transform::transform_credentials,
};

pub mod health;

/// Build the gateway.
///
/// There are no local routes: every request runs the stage stack and, unless
/// a stage answers it, ends in the forwarding fallback.
pub fn router(state: AppState) -> Router {
    let origins = OriginPolicy::new(&state.config.cors);
    let auth = AuthState::new(Arc::clone(&state.verifier), state.config.auth.timeout);

    let stages = ServiceBuilder::new()
        .layer(from_fn_with_state(
            Arc::new(origins.clone()),
            reject_disallowed_origin,
        ))
        .layer(origins.layer())
        .layer(from_fn_with_state(state.clone(), health_short_circuit))
        .layer(from_fn_with_state(
            state.config.client_id.clone(),
            identify_client,
        ))
        .layer(from_fn(drop_unusable_correlation_id))
        .layer(SetRequestIdLayer::new(
            X_CORRELATION_ID.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(X_CORRELATION_ID.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(tag_correlation))
        .layer(from_fn(track_cache_state))
        .layer(from_fn_with_state(auth, authenticate))
        .layer(from_fn_with_state(
            Arc::clone(&state.transformer),
            transform_credentials,
        ));

    Router::new()
        .fallback(routing::forward)
        .with_state(Arc::clone(&state.upstream))
        .layer(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, ExternalIdentity, TokenVerifier};
    use crate::cache::MemoryCache;
    use crate::config::GatewayConfig;
    use crate::routing::{Upstream, UpstreamError};
    use async_trait::async_trait;
    use axum::{extract::Request, response::Response};

    struct NoVerifier;

    #[async_trait]
    impl TokenVerifier for NoVerifier {
        async fn verify(&self, _token: &str) -> Result<ExternalIdentity, AuthError> {
            Err(AuthError::InvalidSignature)
        }
    }

    struct NoUpstream;

    #[async_trait]
    impl Upstream for NoUpstream {
        async fn forward(&self, _request: Request) -> Result<Response, UpstreamError> {
            Err(UpstreamError::Unavailable("test".into()))
        }
    }

    #[tokio::test]
    async fn router_builds_with_all_stages() {
        let config = GatewayConfig::from_lookup(|var| match var {
            "INTERNAL_TOKEN_SECRET" => Some("0123456789abcdef0123456789abcdef".to_string()),
            "AUTH0_DOMAIN" => Some("tenant.auth0.com".to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState::new(
            config,
            Arc::new(NoVerifier),
            Arc::new(MemoryCache::new(8)),
            Arc::new(NoUpstream),
        )
        .unwrap();
        // Ensure the router can be converted into a service without panicking.
        let _ = router(state).into_make_service();
    }
}
