// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Correlation ids.
//!
//! `tower_http::request_id` keeps an inbound `X-Correlation-Id` or generates
//! a UUID v4, and echoes it on the response. An inbound id that is empty or
//! not UTF-8 is dropped first so a fresh one is generated. The middleware
//! here copies the id into the [`RequestContext`] so later stages can log it.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use tracing::Span;

use super::context::RequestContext;

pub static X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Correlation id carried by `headers`, if any.
pub fn correlation_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(&X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

/// Middleware: remove an inbound correlation id that cannot be used.
pub async fn drop_unusable_correlation_id(mut request: Request, next: Next) -> Response {
    let headers = request.headers_mut();
    if headers.contains_key(&X_CORRELATION_ID) && correlation_id(headers).is_none() {
        tracing::debug!("Discarding empty or non-UTF-8 correlation id");
        headers.remove(&X_CORRELATION_ID);
    }
    next.run(request).await
}

/// Root span of a gateway request.
///
/// `client_id` is recorded later, once it is known.
pub fn make_request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        correlation_id = correlation_id(request.headers()).unwrap_or_default(),
        client_id = tracing::field::Empty,
    )
}

/// Middleware: record the correlation id in the request context.
pub async fn tag_correlation(mut request: Request, next: Next) -> Response {
    let id = correlation_id(request.headers())
        .unwrap_or_default()
        .to_string();

    if let Some(ctx) = request.extensions_mut().get_mut::<RequestContext>() {
        Span::current().record("client_id", ctx.client_id.as_str());
        ctx.correlation_id = id;
    }
    next.run(request).await
}
