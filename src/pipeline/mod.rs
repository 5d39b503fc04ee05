// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Pipeline
//!
//! Every request passes the stages in this order (outermost first):
//!
//! | # | Stage | Short-circuits with |
//! |---|-------|---------------------|
//! | 1 | Origin guard + CORS | `403` for disallowed origins |
//! | 2 | Health | probe response for configured health paths |
//! | 3 | Client identification | |
//! | 4 | Correlation id + request span | |
//! | 5 | Cache state reporting | |
//! | 6 | Authentication ([`crate::auth`]) | `401` / `503` |
//! | 7 | Credential transformation ([`crate::transform`]) | `500` |
//! | 8 | Routing ([`crate::routing`]) | `502` / `504` |
//!
//! A stage that short-circuits prevents every later stage from running.
//! The stack is assembled in [`crate::api::router`].

pub mod cache_state;
pub mod client_id;
pub mod context;
pub mod correlation;
pub mod cors;
pub mod health;

pub use cache_state::{track_cache_state, X_CACHE};
pub use client_id::{derive_client_id, identify_client, X_CLIENT_ID};
pub use context::{CacheState, RequestContext};
pub use correlation::{
    drop_unusable_correlation_id, make_request_span, tag_correlation, X_CORRELATION_ID,
};
pub use cors::{reject_disallowed_origin, OriginPolicy};
pub use health::health_short_circuit;
