// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Routing
//!
//! Final pipeline stage. Authenticated, rewritten requests are handed to an
//! [`Upstream`]: the routing engine over HTTP, wrapped in a response cache
//! for idempotent reads.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

pub mod caching;
pub mod http;

pub use caching::{CachedResponse, CachingUpstream};
pub use http::HttpUpstream;

/// Forwarding failure. Becomes a gateway error response.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("request body exceeds the gateway limit")]
    PayloadTooLarge,
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        match self {
            UpstreamError::Timeout => ApiError::gateway_timeout("Upstream request timed out"),
            UpstreamError::Unavailable(_) => ApiError::bad_gateway("Upstream unavailable"),
            UpstreamError::PayloadTooLarge => {
                ApiError::payload_too_large("Request body exceeds the gateway limit")
            }
        }
        .into_response()
    }
}

/// Destination of forwarded requests.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: Request) -> Result<Response, UpstreamError>;
}

/// Connection-scoped headers that must not be forwarded by a proxy.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Drop hop-by-hop headers, including any named by `Connection`.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(axum::http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Router fallback: forward everything that reached the end of the pipeline.
pub async fn forward(State(upstream): State<Arc<dyn Upstream>>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match upstream.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%method, path, error = %e, "Forwarding failed");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-secret-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-secret-hop", HeaderValue::from_static("1"));
        headers.insert("x-correlation-id", HeaderValue::from_static("abc"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-secret-hop").is_none());
        assert_eq!(headers["x-correlation-id"], "abc");
    }

    #[test]
    fn upstream_errors_map_to_gateway_statuses() {
        assert_eq!(
            UpstreamError::Timeout.into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            UpstreamError::Unavailable("refused".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            UpstreamError::PayloadTooLarge.into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
