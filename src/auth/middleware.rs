// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication stage.
//!
//! Validates the inbound bearer credential against the trusted providers and
//! attaches the resulting [`ExternalIdentity`] to the request extensions.
//! Requests without a valid credential never reach the later stages.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::AuthError;
use super::identity::ExternalIdentity;
use super::verifier::TokenVerifier;
use crate::pipeline::RequestContext;

/// Shared state of the authentication stage.
#[derive(Clone)]
pub struct AuthState {
    verifier: Arc<dyn TokenVerifier>,
    timeout: Duration,
}

impl AuthState {
    pub fn new(verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Verify `token`, bounded by the configured timeout.
    pub async fn verify(&self, token: &str) -> Result<ExternalIdentity, AuthError> {
        tokio::time::timeout(self.timeout, self.verifier.verify(token))
            .await
            .map_err(|_| AuthError::Timeout)?
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Authentication middleware function.
pub async fn authenticate(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (correlation_id, client_id) = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| (ctx.correlation_id.clone(), ctx.client_id.clone()))
        .unwrap_or_default();

    let result = match bearer_token(request.headers()) {
        Ok(token) => auth.verify(token).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(identity) => {
            tracing::debug!(
                correlation_id = %correlation_id,
                client_id = %client_id,
                issuer = identity.issuer(),
                "Request authenticated"
            );
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            if e.is_transient() {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    client_id = %client_id,
                    error = %e,
                    "Token verification unavailable"
                );
            } else {
                tracing::info!(
                    correlation_id = %correlation_id,
                    client_id = %client_id,
                    error_code = e.error_code(),
                    "Rejected unauthenticated request"
                );
            }
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&headers("Basic dXNlcjpwYXNz")),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&headers("Bearer ")),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&headers("Bearer")),
            Err(AuthError::InvalidAuthHeader)
        ));
    }

    struct SlowVerifier;

    #[async_trait]
    impl TokenVerifier for SlowVerifier {
        async fn verify(&self, _token: &str) -> Result<ExternalIdentity, AuthError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ExternalIdentity::default())
        }
    }

    #[tokio::test]
    async fn slow_verification_times_out() {
        let auth = AuthState::new(Arc::new(SlowVerifier), Duration::from_millis(20));
        assert!(matches!(auth.verify("t").await, Err(AuthError::Timeout)));
    }
}
