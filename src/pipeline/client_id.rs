// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client identification.
//!
//! Derives a client identifier for rate limiting and attribution and sends it
//! upstream as `X-Client-Id`. An inbound `X-Client-Id` is always overwritten.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::context::RequestContext;
use crate::config::ClientIdConfig;

pub static X_CLIENT_ID: HeaderName = HeaderName::from_static("x-client-id");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Identifier used when neither a peer address nor a trusted hop is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Compute the client identifier for a request.
///
/// With `trust_forwarded_for` the first `X-Forwarded-For` hop wins; otherwise
/// only the transport peer address is used.
pub fn derive_client_id(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    config: &ClientIdConfig,
) -> String {
    if config.trust_forwarded_for {
        let first_hop = headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = first_hop {
            return hop.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware: create the [`RequestContext`] and tag the client.
pub async fn identify_client(
    State(config): State<ClientIdConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_id = derive_client_id(request.headers(), peer, &config);

    match HeaderValue::from_str(&client_id) {
        Ok(value) => {
            request.headers_mut().insert(X_CLIENT_ID.clone(), value);
        }
        Err(_) => {
            request.headers_mut().remove(&X_CLIENT_ID);
        }
    }

    request.extensions_mut().insert(RequestContext {
        client_id,
        ..RequestContext::default()
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("10.1.2.3:45678".parse().unwrap())
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR.clone(), HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn peer_address_without_port() {
        let id = derive_client_id(&HeaderMap::new(), peer(), &ClientIdConfig::default());
        assert_eq!(id, "10.1.2.3");
    }

    #[test]
    fn forwarded_for_ignored_unless_trusted() {
        let headers = forwarded("203.0.113.7, 10.0.0.1");
        let id = derive_client_id(&headers, peer(), &ClientIdConfig::default());
        assert_eq!(id, "10.1.2.3");

        let trusted = ClientIdConfig {
            trust_forwarded_for: true,
        };
        assert_eq!(derive_client_id(&headers, peer(), &trusted), "203.0.113.7");
    }

    #[test]
    fn empty_forwarded_for_falls_back_to_peer() {
        let trusted = ClientIdConfig {
            trust_forwarded_for: true,
        };
        assert_eq!(derive_client_id(&forwarded(" "), peer(), &trusted), "10.1.2.3");
    }

    #[test]
    fn no_peer_is_unknown() {
        let id = derive_client_id(&HeaderMap::new(), None, &ClientIdConfig::default());
        assert_eq!(id, UNKNOWN_CLIENT);
    }
}
