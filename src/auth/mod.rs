// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Verifies the caller's external bearer token.
//!
//! ## Auth Flow
//!
//! 1. Client authenticates with Auth0, Google or another trusted OIDC issuer
//! 2. Client sends `Authorization: Bearer <external JWT>`
//! 3. Gateway:
//!    - Reads the unverified `iss` to select the trusted provider
//!    - Verifies signature (JWKS or shared secret), expiry, issuer, audience
//!    - Attaches the claims as an [`ExternalIdentity`]
//!
//! ## Security
//!
//! - Every path except the configured health paths requires authentication
//! - JWKS is fetched over HTTPS and cached with a TTL
//! - Clock skew tolerance is 60 seconds
//! - Verification is bounded by a timeout; an unavailable verifier yields 503

pub mod error;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod verifier;

pub use error::AuthError;
pub use identity::ExternalIdentity;
pub use jwks::JwksManager;
pub use middleware::{authenticate, bearer_token, AuthState};
pub use verifier::{ProviderVerifier, TokenVerifier};
