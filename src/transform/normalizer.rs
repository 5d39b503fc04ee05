// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claim normalization across identity providers.
//!
//! Every canonical field is resolved from an ordered list of candidate claim
//! keys, first match wins. Adding a provider means extending the tables
//! below, not adding code paths.

use serde::{Deserialize, Serialize};

use crate::auth::ExternalIdentity;

/// .NET/WS-Federation claim URIs emitted by some providers.
pub const NAME_IDENTIFIER_URI: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
pub const EMAIL_URI: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
pub const NAME_URI: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
pub const ROLE_URI: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// Identity provider that issued the external token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Auth0,
    Google,
    Unknown,
}

impl AuthProvider {
    /// Ordered issuer markers; the first marker contained in the issuer wins.
    const MARKERS: [(&'static str, AuthProvider); 2] = [
        ("auth0.com", AuthProvider::Auth0),
        ("accounts.google.com", AuthProvider::Google),
    ];

    pub fn from_issuer(issuer: &str) -> Self {
        Self::MARKERS
            .iter()
            .find(|(marker, _)| issuer.contains(marker))
            .map(|(_, provider)| *provider)
            .unwrap_or(AuthProvider::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Auth0 => "auth0",
            AuthProvider::Google => "google",
            AuthProvider::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-independent identity.
///
/// `auth_provider` is always set; every other field is present only when the
/// external identity carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalClaimSet {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub auth_provider: AuthProvider,
    pub original_issuer: Option<String>,
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
}

/// Ordered candidate claim keys for one canonical field.
#[derive(Debug, Clone)]
pub struct ClaimResolver {
    candidates: Vec<String>,
}

impl ClaimResolver {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// First non-empty value across the candidates, in candidate order.
    pub fn first(&self, identity: &ExternalIdentity) -> Option<String> {
        self.candidates.iter().find_map(|key| {
            identity
                .all(key)
                .find(|v| !v.trim().is_empty())
                .map(str::to_string)
        })
    }

    /// Every non-empty value under any candidate key, in claim order.
    /// Duplicates are kept.
    pub fn all(&self, identity: &ExternalIdentity) -> Vec<String> {
        identity
            .claims()
            .iter()
            .filter(|(key, _)| self.candidates.contains(key))
            .map(|(_, value)| value.as_str())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Maps external identities into [`CanonicalClaimSet`]s. Pure and infallible.
#[derive(Debug, Clone)]
pub struct ClaimNormalizer {
    pub user_id: ClaimResolver,
    pub email: ClaimResolver,
    pub name: ClaimResolver,
    pub scope: ClaimResolver,
    pub role: ClaimResolver,
}

impl Default for ClaimNormalizer {
    fn default() -> Self {
        Self {
            user_id: ClaimResolver::new(["sub", NAME_IDENTIFIER_URI, "oid"]),
            email: ClaimResolver::new(["email", EMAIL_URI]),
            name: ClaimResolver::new(["name", NAME_URI, "given_name"]),
            scope: ClaimResolver::new(["scope", "scp"]),
            role: ClaimResolver::new(["role", "roles", ROLE_URI]),
        }
    }
}

impl ClaimNormalizer {
    pub fn normalize(&self, identity: &ExternalIdentity) -> CanonicalClaimSet {
        let issuer = identity.issuer();
        let auth_provider = AuthProvider::from_issuer(issuer);

        // OAuth2 scope claims are space-delimited strings.
        let scopes = self
            .scope
            .all(identity)
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(str::to_string)
            .collect();

        let claims = CanonicalClaimSet {
            user_id: self.user_id.first(identity),
            email: self.email.first(identity),
            name: self.name.first(identity),
            auth_provider,
            original_issuer: (!issuer.is_empty()).then(|| issuer.to_string()),
            scopes,
            roles: self.role.all(identity),
        };

        tracing::debug!(provider = %auth_provider, "Normalized external claims");
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(issuer: &str, claims: &[(&str, &str)]) -> ExternalIdentity {
        let mut all = vec![("iss".to_string(), issuer.to_string())];
        all.extend(claims.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        ExternalIdentity::new(issuer, all)
    }

    #[test]
    fn auth0_scenario() {
        let id = identity(
            "https://x.auth0.com/",
            &[("sub", "abc123"), ("email", "a@b.com")],
        );
        let claims = ClaimNormalizer::default().normalize(&id);

        assert_eq!(
            claims,
            CanonicalClaimSet {
                user_id: Some("abc123".to_string()),
                email: Some("a@b.com".to_string()),
                name: None,
                auth_provider: AuthProvider::Auth0,
                original_issuer: Some("https://x.auth0.com/".to_string()),
                scopes: vec![],
                roles: vec![],
            }
        );
    }

    #[test]
    fn provider_detection_by_issuer_substring() {
        assert_eq!(
            AuthProvider::from_issuer("https://tenant.eu.auth0.com/"),
            AuthProvider::Auth0
        );
        assert_eq!(
            AuthProvider::from_issuer("https://accounts.google.com"),
            AuthProvider::Google
        );
        assert_eq!(
            AuthProvider::from_issuer("https://login.microsoftonline.com/t/v2.0"),
            AuthProvider::Unknown
        );
        assert_eq!(AuthProvider::from_issuer(""), AuthProvider::Unknown);
    }

    #[test]
    fn auth0_marker_is_checked_first() {
        assert_eq!(
            AuthProvider::from_issuer("https://accounts.google.com.auth0.com/"),
            AuthProvider::Auth0
        );
    }

    #[test]
    fn user_id_falls_back_in_order() {
        let n = ClaimNormalizer::default();

        let id = identity("iss", &[("oid", "o-1"), (NAME_IDENTIFIER_URI, "ni-1")]);
        assert_eq!(n.normalize(&id).user_id.as_deref(), Some("ni-1"));

        let id = identity("iss", &[("oid", "o-1")]);
        assert_eq!(n.normalize(&id).user_id.as_deref(), Some("o-1"));

        let id = identity("iss", &[("oid", "o-1"), ("sub", "s-1")]);
        assert_eq!(n.normalize(&id).user_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn empty_values_count_as_absent() {
        let id = identity("iss", &[("sub", ""), ("oid", "o-1"), ("email", " ")]);
        let claims = ClaimNormalizer::default().normalize(&id);
        assert_eq!(claims.user_id.as_deref(), Some("o-1"));
        assert_eq!(claims.email, None);
    }

    #[test]
    fn name_uses_given_name_last() {
        let n = ClaimNormalizer::default();
        let id = identity("iss", &[("given_name", "Ada")]);
        assert_eq!(n.normalize(&id).name.as_deref(), Some("Ada"));

        let id = identity("iss", &[("given_name", "Ada"), ("name", "Ada Lovelace")]);
        assert_eq!(n.normalize(&id).name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn multi_valued_claims_keep_source_order_and_duplicates() {
        let id = identity(
            "https://accounts.google.com",
            &[
                ("scope", "read:a write:b"),
                ("scope", "read:a"),
                ("roles", "editor"),
                ("role", "admin"),
                ("roles", "editor"),
            ],
        );
        let claims = ClaimNormalizer::default().normalize(&id);

        assert_eq!(claims.scopes, vec!["read:a", "write:b", "read:a"]);
        assert_eq!(claims.roles, vec!["editor", "admin", "editor"]);
        assert_eq!(claims.auth_provider, AuthProvider::Google);
    }

    #[test]
    fn missing_issuer_yields_unknown_and_no_original_issuer() {
        let id = ExternalIdentity::new("", vec![("sub".to_string(), "x".to_string())]);
        let claims = ClaimNormalizer::default().normalize(&id);
        assert_eq!(claims.auth_provider, AuthProvider::Unknown);
        assert_eq!(claims.original_issuer, None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let id = identity(
            "https://x.auth0.com/",
            &[("sub", "abc"), ("scope", "a b"), ("roles", "r")],
        );
        let n = ClaimNormalizer::default();
        assert_eq!(n.normalize(&id), n.normalize(&id));
    }

    #[test]
    fn custom_resolvers_extend_provider_support() {
        let mut n = ClaimNormalizer::default();
        n.role = ClaimResolver::new(["https://example.com/roles"]);
        let id = identity("iss", &[("https://example.com/roles", "ops"), ("roles", "x")]);
        assert_eq!(n.normalize(&id).roles, vec!["ops"]);
    }
}
