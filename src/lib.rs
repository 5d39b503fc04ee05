// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity Gateway - token-translating edge gateway
//!
//! Verifies externally issued identity tokens (Auth0, Google, any trusted
//! OIDC issuer), normalizes their claims, and forwards each request to the
//! routing engine with a freshly issued internal token.
//!
//! ## Modules
//!
//! - `api` - Router assembly and health probes (Axum)
//! - `auth` - External token verification (JWKS / shared secret)
//! - `cache` - Response cache providers (in-memory, Redis)
//! - `pipeline` - Per-request stages and their ordering
//! - `routing` - Forwarding to the routing engine
//! - `transform` - Claim normalization and internal token issuance

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod routing;
pub mod state;
pub mod transform;
