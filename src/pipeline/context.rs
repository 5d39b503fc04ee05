// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request context.

use std::fmt;

/// Values attached to a request as it moves through the pipeline.
///
/// Stored in the request extensions. Each field is written by exactly one
/// stage and the whole bag is dropped with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Set by the correlation stage.
    pub correlation_id: String,
    /// Set by the client identification stage.
    pub client_id: String,
    /// Set once the response is known.
    pub cache_state: CacheState,
}

/// Whether a response came from the response cache.
///
/// The routing stage attaches this to the response extensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheState {
    Hit,
    Miss,
    #[default]
    NotApplicable,
}

impl CacheState {
    /// `X-Cache` header value, if one should be sent.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            CacheState::Hit => Some("HIT"),
            CacheState::Miss => Some("MISS"),
            CacheState::NotApplicable => None,
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheState::Hit => "HIT",
            CacheState::Miss => "MISS",
            CacheState::NotApplicable => "NOT_APPLICABLE",
        })
    }
}
