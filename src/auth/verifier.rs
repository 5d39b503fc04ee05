// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External token verification across trusted providers.
//!
//! The unverified `iss` claim only selects which provider's keys and rules to
//! apply; the token is then fully validated (signature, issuer, audience,
//! expiry) against that provider before any claim is trusted.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::AuthError;
use super::identity::ExternalIdentity;
use super::jwks::JwksManager;
use crate::config::{ConfigError, ExternalAuthConfig, ProviderKeys};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Validates external tokens and exposes the resulting identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, AuthError>;

    /// Per-provider key availability, for readiness probes.
    async fn key_status(&self) -> Vec<(String, bool)> {
        Vec::new()
    }
}

enum KeySource {
    Jwks(JwksManager),
    Shared(DecodingKey),
}

struct TrustedProvider {
    name: String,
    issuers: Vec<String>,
    audience: Option<String>,
    keys: KeySource,
}

/// Verifier over the configured identity providers.
pub struct ProviderVerifier {
    providers: Vec<TrustedProvider>,
}

/// Only the issuer is read before verification.
#[derive(Deserialize)]
struct UnverifiedIssuer {
    #[serde(default)]
    iss: String,
}

impl ProviderVerifier {
    pub fn from_config(config: &ExternalAuthConfig) -> Result<Self, ConfigError> {
        let providers = config
            .providers
            .iter()
            .map(|p| -> Result<TrustedProvider, ConfigError> {
                let keys = match &p.keys {
                    ProviderKeys::Jwks { url } => {
                        KeySource::Jwks(JwksManager::new(url.clone(), config.timeout)?)
                    }
                    ProviderKeys::SharedSecret(secret) => {
                        KeySource::Shared(DecodingKey::from_secret(secret.expose().as_bytes()))
                    }
                };
                Ok(TrustedProvider {
                    name: p.name.clone(),
                    issuers: p.issuers.clone(),
                    audience: p.audience.clone(),
                    keys,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { providers })
    }

    fn provider_for(&self, issuer: &str) -> Option<&TrustedProvider> {
        self.providers
            .iter()
            .find(|p| p.issuers.iter().any(|i| i == issuer))
    }
}

#[async_trait]
impl TokenVerifier for ProviderVerifier {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let unverified = jsonwebtoken::dangerous::insecure_decode::<UnverifiedIssuer>(token)
            .map_err(|_| AuthError::MalformedToken)?;

        let provider = self
            .provider_for(&unverified.claims.iss)
            .ok_or(AuthError::InvalidIssuer)?;

        let (decoding_key, algorithm) = match &provider.keys {
            KeySource::Jwks(jwks) => match &header.kid {
                Some(kid) => jwks.get_decoding_key(kid).await?,
                None => jwks.get_any_decoding_key().await?,
            },
            KeySource::Shared(key) => (key.clone(), Algorithm::HS256),
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&provider.issuers);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        match &provider.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Map<String, Value>>(token, &decoding_key, &validation)?;

        tracing::debug!(provider = %provider.name, "External token verified");
        Ok(ExternalIdentity::from_json_claims(&token_data.claims))
    }

    async fn key_status(&self) -> Vec<(String, bool)> {
        let mut status = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let ok = match &provider.keys {
                KeySource::Jwks(jwks) => jwks.is_available().await,
                KeySource::Shared(_) => true,
            };
            status.push((provider.name.clone(), ok));
        }
        status
    }
}
