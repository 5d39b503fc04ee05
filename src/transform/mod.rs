// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Translation
//!
//! Turns a verified external identity into an internal credential:
//!
//! 1. [`ClaimNormalizer`] maps provider-specific claims into a
//!    [`CanonicalClaimSet`]
//! 2. [`InternalTokenIssuer`] signs the canonical set (HS256, fixed TTL)
//! 3. [`TransformationStage`] swaps the outbound `Authorization` header and
//!    keeps the original under `X-Original-Authorization`
//!
//! A new internal token is issued for every request; nothing is cached or
//! revocable.

pub mod error;
pub mod issuer;
pub mod normalizer;
pub mod stage;

pub use error::TransformError;
pub use issuer::{
    InternalClaims, InternalToken, InternalTokenIssuer, InternalTokenVerifier, SigningError,
    TokenIssuer,
};
pub use normalizer::{AuthProvider, CanonicalClaimSet, ClaimNormalizer, ClaimResolver};
pub use stage::{transform_credentials, CredentialRewrite, TransformationStage, X_ORIGINAL_AUTHORIZATION};
