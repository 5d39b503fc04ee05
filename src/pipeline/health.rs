// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Health short-circuit.
//!
//! Configured health paths are answered by the gateway itself, without a
//! credential and without reaching the routing engine.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::health::{liveness, readiness};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Liveness,
    Readiness,
}

impl Probe {
    /// `/health` and `*/ready` check dependencies; any other health path is
    /// a liveness probe.
    pub fn for_path(path: &str) -> Self {
        if path == "/health" || path.ends_with("/ready") {
            Probe::Readiness
        } else {
            Probe::Liveness
        }
    }
}

pub async fn health_short_circuit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !state.config.health_paths.iter().any(|p| p == path) {
        return next.run(request).await;
    }

    match Probe::for_path(path) {
        Probe::Liveness => liveness().await.into_response(),
        Probe::Readiness => readiness(&state).await.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_kind_by_path() {
        assert_eq!(Probe::for_path("/health"), Probe::Readiness);
        assert_eq!(Probe::for_path("/health/ready"), Probe::Readiness);
        assert_eq!(Probe::for_path("/health/live"), Probe::Liveness);
        assert_eq!(Probe::for_path("/healthz"), Probe::Liveness);
    }
}
