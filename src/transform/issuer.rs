// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Internal token minting and verification.
//!
//! Internal tokens are HS256 JWTs signed with a secret shared between the
//! gateway and downstream services. Their `iss`/`aud` pair never matches any
//! external provider, so an external token presented downstream is rejected
//! even when it is otherwise valid.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::normalizer::{AuthProvider, CanonicalClaimSet};
use crate::config::{InternalTokenConfig, Secret};

/// Minimum secret length in bytes (256 bits for HS256).
pub const MIN_SECRET_LEN: usize = 32;

/// Clock skew tolerance for downstream verification (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Errors raised while signing internal tokens.
///
/// Secret problems are detected when the issuer is built at startup;
/// `Encode` is the only variant that can surface per request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("internal token signing secret is empty or unset")]
    MissingSecret,

    #[error("internal token signing secret must be at least {min} bytes")]
    WeakSecret { min: usize },

    #[error("internal token expiry is out of range")]
    ExpiryOutOfRange,

    #[error("failed to encode internal token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Reject secrets that cannot safely key HS256.
pub fn check_signing_secret(secret: &Secret) -> Result<(), SigningError> {
    let bytes = secret.expose().as_bytes();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(SigningError::MissingSecret);
    }
    if bytes.len() < MIN_SECRET_LEN {
        return Err(SigningError::WeakSecret {
            min: MIN_SECRET_LEN,
        });
    }
    Ok(())
}

/// Claim body of an internal token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub auth_provider: AuthProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role: Vec<String>,
}

impl InternalClaims {
    /// The canonical identity carried by this token.
    pub fn canonical(&self) -> CanonicalClaimSet {
        CanonicalClaimSet {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            auth_provider: self.auth_provider,
            original_issuer: self.original_issuer.clone(),
            scopes: self.scope.clone(),
            roles: self.role.clone(),
        }
    }
}

/// A signed internal credential. Never persisted.
#[derive(Clone)]
pub struct InternalToken {
    /// Compact JWS serialization.
    pub token: String,
    pub claims: InternalClaims,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for InternalToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalToken")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Mints the internal credential for a canonical claim set.
pub trait TokenIssuer: Send + Sync {
    fn issue(
        &self,
        claims: &CanonicalClaimSet,
        now: DateTime<Utc>,
    ) -> Result<InternalToken, SigningError>;
}

/// Signs canonical claim sets into internal tokens.
///
/// Built once at startup and shared by every request; holds no per-request
/// state.
pub struct InternalTokenIssuer {
    issuer: String,
    audience: String,
    ttl: chrono::Duration,
    key: EncodingKey,
}

impl InternalTokenIssuer {
    /// Fails fast when the signing secret is unset or too short.
    pub fn new(config: &InternalTokenConfig) -> Result<Self, SigningError> {
        check_signing_secret(&config.secret)?;
        Ok(Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: config.ttl(),
            key: EncodingKey::from_secret(config.secret.expose().as_bytes()),
        })
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Sign `claims` as of `now`. `expires_at` is always `now + ttl`.
    pub fn issue(
        &self,
        claims: &CanonicalClaimSet,
        now: DateTime<Utc>,
    ) -> Result<InternalToken, SigningError> {
        // JWT timestamps have second precision.
        let issued_at = DateTime::<Utc>::from_timestamp(now.timestamp(), 0)
            .ok_or(SigningError::ExpiryOutOfRange)?;
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or(SigningError::ExpiryOutOfRange)?;

        let body = InternalClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            user_id: claims.user_id.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
            auth_provider: claims.auth_provider,
            original_issuer: claims.original_issuer.clone(),
            scope: claims.scopes.clone(),
            role: claims.roles.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &body, &self.key)?;

        tracing::info!(
            user_id = claims.user_id.as_deref().unwrap_or("unknown"),
            provider = %claims.auth_provider,
            expires_at = %expires_at,
            "Issued internal token"
        );

        Ok(InternalToken {
            token,
            claims: body,
            issued_at,
            expires_at,
        })
    }
}

impl TokenIssuer for InternalTokenIssuer {
    fn issue(
        &self,
        claims: &CanonicalClaimSet,
        now: DateTime<Utc>,
    ) -> Result<InternalToken, SigningError> {
        InternalTokenIssuer::issue(self, claims, now)
    }
}

/// Errors returned by [`InternalTokenVerifier`].
#[derive(Debug, thiserror::Error)]
pub enum InternalTokenError {
    #[error("internal token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// Validates internal tokens the way a downstream service must: HS256 only,
/// matching issuer and audience, signature under the shared secret.
pub struct InternalTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl InternalTokenVerifier {
    pub fn new(config: &InternalTokenConfig) -> Result<Self, SigningError> {
        check_signing_secret(&config.secret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        Ok(Self {
            key: DecodingKey::from_secret(config.secret.expose().as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<InternalClaims, InternalTokenError> {
        Ok(decode::<InternalClaims>(token, &self.key, &self.validation)?.claims)
    }
}
