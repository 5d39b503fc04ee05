// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Response cache reporting.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::context::{CacheState, RequestContext};

pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Middleware: expose the routing stage's cache outcome as `X-Cache`.
///
/// Responses that were not eligible for caching carry no `X-Cache` header.
pub async fn track_cache_state(request: Request, next: Next) -> Response {
    let mut ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();

    let mut response = next.run(request).await;
    ctx.cache_state = response
        .extensions()
        .get::<CacheState>()
        .copied()
        .unwrap_or_default();

    match ctx.cache_state.header_value() {
        Some(value) => {
            response
                .headers_mut()
                .insert(X_CACHE.clone(), HeaderValue::from_static(value));
        }
        None => {
            response.headers_mut().remove(&X_CACHE);
        }
    }

    tracing::debug!(
        correlation_id = %ctx.correlation_id,
        client_id = %ctx.client_id,
        cache = %ctx.cache_state,
        status = response.status().as_u16(),
        "Request completed"
    );
    response
}
