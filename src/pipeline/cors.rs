// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-origin policy.
//!
//! Requests carrying an `Origin` outside the allow-list are rejected before
//! any other stage runs. Allowed origins then get the usual CORS headers
//! from `tower_http::cors`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::ORIGIN, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;
use crate::error::ApiError;

/// Origin allow-list shared by the guard and the CORS layer.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    any: bool,
    allowed: Vec<HeaderValue>,
}

impl OriginPolicy {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            any: config.allowed_origins.iter().any(|o| o == "*"),
            allowed: config
                .allowed_origins
                .iter()
                .filter(|o| o.as_str() != "*")
                .filter_map(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok())
                .collect(),
        }
    }

    pub fn allows(&self, origin: &HeaderValue) -> bool {
        self.any || self.allowed.iter().any(|o| o == origin)
    }

    /// CORS response headers for allowed origins.
    ///
    /// Credentials are allowed, so methods and headers mirror the preflight
    /// request instead of using wildcards.
    pub fn layer(&self) -> CorsLayer {
        let origins = if self.any {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::list(self.allowed.clone())
        };

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
            .expose_headers([
                HeaderName::from_static("x-correlation-id"),
                HeaderName::from_static("x-cache"),
            ])
    }
}

/// Middleware: reject disallowed origins with `403`.
///
/// Requests without an `Origin` header (same-origin, server-to-server) pass.
pub async fn reject_disallowed_origin(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(origin) = request.headers().get(ORIGIN) {
        if !policy.allows(origin) {
            tracing::warn!(
                origin = origin.to_str().unwrap_or("<non-ascii>"),
                path = request.uri().path(),
                "Rejected request from disallowed origin"
            );
            return ApiError::forbidden("origin_not_allowed", "Origin is not allowed").into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(origins: &[&str]) -> OriginPolicy {
        OriginPolicy::new(&CorsConfig {
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn only_listed_origins_are_allowed() {
        let p = policy(&["http://localhost:5173"]);
        assert!(p.allows(&HeaderValue::from_static("http://localhost:5173")));
        assert!(!p.allows(&HeaderValue::from_static("http://evil.example.com")));
    }

    #[test]
    fn trailing_slash_in_config_is_ignored() {
        let p = policy(&["https://app.example.com/"]);
        assert!(p.allows(&HeaderValue::from_static("https://app.example.com")));
    }

    #[test]
    fn wildcard_allows_everything() {
        let p = policy(&["*"]);
        assert!(p.allows(&HeaderValue::from_static("https://anything.example.com")));
    }
}
