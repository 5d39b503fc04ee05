// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transformation errors.

use axum::{
    http::{header::InvalidHeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::issuer::SigningError;

/// Unexpected fault while rewriting a credential.
///
/// Always answered with a server fault; the request is not forwarded.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("internal token is not a valid header value")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

#[derive(Serialize)]
struct TransformErrorBody {
    error: &'static str,
    error_code: &'static str,
}

impl IntoResponse for TransformError {
    fn into_response(self) -> Response {
        // Details stay in the logs.
        let body = Json(TransformErrorBody {
            error: "Token transformation failed",
            error_code: "token_transformation_failed",
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
