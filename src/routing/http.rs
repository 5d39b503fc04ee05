// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP forwarding to the routing engine.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::header::HOST,
    response::Response,
};
use url::Url;

use super::{strip_hop_by_hop, Upstream, UpstreamError};
use crate::config::{RoutingConfig, MAX_BODY_BYTES};

/// Forwards requests to a fixed base URL over HTTP.
pub struct HttpUpstream {
    base: Url,
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(config: &RoutingConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base: config.upstream_url.clone(),
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
        })
    }

    /// Upstream URL for an inbound path and query.
    pub fn target(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            path_and_query
        )
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: Request) -> Result<Response, UpstreamError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = self.target(path_and_query);

        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|_| UpstreamError::PayloadTooLarge)?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Unavailable(e.to_string())
                }
            })?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let bytes = upstream.bytes().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Unavailable(e.to_string())
            }
        })?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn target_joins_base_and_path() {
        let upstream = HttpUpstream::new(&RoutingConfig {
            upstream_url: Url::parse("http://routing:5001/").unwrap(),
            timeout: Duration::from_secs(1),
            response_cache_ttl: Duration::from_secs(30),
        })
        .unwrap();
        assert_eq!(
            upstream.target("/products?page=2"),
            "http://routing:5001/products?page=2"
        );
    }
}
