// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::BTreeMap;

use axum::{http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Response cache backend status.
    pub cache: String,
    /// Signing key availability per identity provider.
    pub identity_providers: BTreeMap<String, String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

fn status_label(ok: bool) -> String {
    if ok { "ok" } else { "unavailable" }.to_string()
}

/// Readiness probe.
///
/// Returns 200 if every provider's keys are available, 503 otherwise. A cache
/// outage is reported as `degraded` but keeps the instance ready, since cache
/// failures only turn into misses.
pub async fn readiness(state: &AppState) -> (StatusCode, Json<ReadyResponse>) {
    let cache_ok = match state.cache.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(cache = state.cache.name(), error = %e, "Cache health check failed");
            false
        }
    };

    let providers = state.verifier.key_status().await;
    let keys_ok = providers.iter().all(|(_, ok)| *ok);

    let response = ReadyResponse {
        status: if cache_ok && keys_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            cache: status_label(cache_ok),
            identity_providers: providers
                .into_iter()
                .map(|(name, ok)| (name, status_label(ok)))
                .collect(),
        },
    };

    let status = if keys_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
