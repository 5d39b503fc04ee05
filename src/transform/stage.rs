// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential rewrite stage.
//!
//! Runs after authentication and before forwarding. The stage computes a
//! [`CredentialRewrite`] from the verified identity and applies it to the
//! outbound request; it never forwards a request it failed to rewrite.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use super::error::TransformError;
use super::issuer::TokenIssuer;
use super::normalizer::{CanonicalClaimSet, ClaimNormalizer};
use crate::auth::ExternalIdentity;
use crate::pipeline::RequestContext;

/// Audit header carrying the caller's original credential.
pub static X_ORIGINAL_AUTHORIZATION: HeaderName =
    HeaderName::from_static("x-original-authorization");

/// Header instructions produced for one request.
#[derive(Debug)]
pub struct CredentialRewrite {
    /// `Bearer <internal token>`.
    pub authorization: HeaderValue,
    /// The inbound `Authorization` value, kept for audit.
    pub original_authorization: Option<HeaderValue>,
    pub claims: CanonicalClaimSet,
    pub expires_at: DateTime<Utc>,
}

impl CredentialRewrite {
    /// Replace `Authorization` and set (or clear) the audit header.
    ///
    /// A caller-supplied `X-Original-Authorization` is always dropped.
    pub fn apply(self, headers: &mut HeaderMap) {
        headers.insert(AUTHORIZATION, self.authorization);
        headers.remove(&X_ORIGINAL_AUTHORIZATION);
        if let Some(original) = self.original_authorization {
            headers.insert(X_ORIGINAL_AUTHORIZATION.clone(), original);
        }
    }
}

/// Orchestrates normalization and internal token issuance.
pub struct TransformationStage {
    normalizer: ClaimNormalizer,
    issuer: Arc<dyn TokenIssuer>,
}

impl TransformationStage {
    pub fn new(normalizer: ClaimNormalizer, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { normalizer, issuer }
    }

    /// Compute the outbound credential for `identity`.
    pub fn rewrite(
        &self,
        identity: &ExternalIdentity,
        original: Option<&HeaderValue>,
        now: DateTime<Utc>,
    ) -> Result<CredentialRewrite, TransformError> {
        let claims = self.normalizer.normalize(identity);
        let token = self.issuer.issue(&claims, now)?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token.token))?;
        authorization.set_sensitive(true);

        let original_authorization = original
            .filter(|v| !v.as_bytes().is_empty())
            .map(|v| {
                let mut v = v.clone();
                v.set_sensitive(true);
                v
            });

        Ok(CredentialRewrite {
            authorization,
            original_authorization,
            claims,
            expires_at: token.expires_at,
        })
    }
}

/// Middleware: rewrite the credential of authenticated requests.
///
/// Requests without an [`ExternalIdentity`] pass through untouched; the
/// authentication stage guarantees that only short-circuited paths lack one.
pub async fn transform_credentials(
    State(stage): State<Arc<TransformationStage>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<ExternalIdentity>().cloned() else {
        return next.run(request).await;
    };

    let correlation_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.correlation_id.clone())
        .unwrap_or_default();

    let original = request.headers().get(AUTHORIZATION).cloned();
    match stage.rewrite(&identity, original.as_ref(), Utc::now()) {
        Ok(rewrite) => {
            tracing::debug!(
                correlation_id = %correlation_id,
                user_id = rewrite.claims.user_id.as_deref().unwrap_or("unknown"),
                provider = %rewrite.claims.auth_provider,
                "Transformed external token to internal token"
            );
            request.extensions_mut().insert(rewrite.claims.clone());
            rewrite.apply(request.headers_mut());
            next.run(request).await
        }
        Err(e) => {
            tracing::error!(
                correlation_id = %correlation_id,
                issuer = identity.issuer(),
                error = %e,
                "Token transformation failed"
            );
            e.into_response()
        }
    }
}
