// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Response caching in front of an [`Upstream`].
//!
//! Only `GET` requests answered with `200 OK` are stored. Keys are scoped to
//! the caller's issuer and user id so one identity's response is never served
//! to another; callers without a user id bypass the cache. Bodies larger than
//! the gateway limit, or of unknown size, pass through uncached. Cache
//! failures degrade to a miss.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::Request,
    http::{
        header::{CONTENT_LENGTH, SET_COOKIE},
        HeaderName, HeaderValue, Method, StatusCode,
    },
    response::Response,
};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use super::{is_hop_by_hop, Upstream, UpstreamError};
use crate::cache::CacheProvider;
use crate::config::MAX_BODY_BYTES;
use crate::pipeline::CacheState;
use crate::transform::CanonicalClaimSet;

/// Serialized form of a cached upstream response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Base64 body.
    pub body: String,
}

impl CachedResponse {
    fn capture(response: &Response, body: &[u8]) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name) && **name != SET_COOKIE)
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: response.status().as_u16(),
            headers,
            body: Base64::encode_string(body),
        }
    }

    fn into_response(self) -> Option<Response> {
        let body = Base64::decode_vec(&self.body).ok()?;
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::from_u16(self.status).ok()?;
        for (name, value) in self.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) else {
                continue;
            };
            response.headers_mut().append(name, value);
        }
        Some(response)
    }
}

/// Wraps an upstream with the shared response cache.
pub struct CachingUpstream {
    inner: Arc<dyn Upstream>,
    cache: Arc<dyn CacheProvider>,
    ttl: Duration,
}

impl CachingUpstream {
    pub fn new(inner: Arc<dyn Upstream>, cache: Arc<dyn CacheProvider>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    /// Cache key: method, issuer, user id and full path with query.
    ///
    /// Issuer and user id are length-prefixed so no two identities can build
    /// the same key. `None` when the request carries no user id.
    pub fn cache_key(request: &Request) -> Option<String> {
        let claims = request.extensions().get::<CanonicalClaimSet>()?;
        let user = claims.user_id.as_deref()?;
        let issuer = claims.original_issuer.as_deref().unwrap_or_default();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Some(format!(
            "{}:{}:{}:{}:{}:{}",
            request.method(),
            issuer.len(),
            issuer,
            user.len(),
            user,
            path_and_query
        ))
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CachedResponse>(&bytes) {
                Ok(cached) => cached.into_response(),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(cache = self.cache.name(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, response: Response) -> Result<Response, UpstreamError> {
        if !fits_in_cache(&response) {
            tracing::debug!(
                status = response.status().as_u16(),
                "Response body too large or unbounded, not caching"
            );
            return Ok(response);
        }

        let (parts, body) = response.into_parts();
        // The size is bounded here, so this only fails if the body stream breaks.
        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        let response = Response::from_parts(parts, Body::from(bytes.clone()));

        let entry = CachedResponse::capture(&response, &bytes);
        match serde_json::to_vec(&entry) {
            Ok(value) => {
                if let Err(e) = self.cache.set(key, value, self.ttl).await {
                    tracing::warn!(cache = self.cache.name(), error = %e, "Cache write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize cache entry"),
        }
        Ok(response)
    }
}

/// Whether the body is known to fit within [`MAX_BODY_BYTES`].
fn fits_in_cache(response: &Response) -> bool {
    let limit = MAX_BODY_BYTES as u64;
    let declared = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    declared.is_none_or(|len| len <= limit)
        && response
            .body()
            .size_hint()
            .upper()
            .is_some_and(|len| len <= limit)
}

#[async_trait]
impl Upstream for CachingUpstream {
    async fn forward(&self, request: Request) -> Result<Response, UpstreamError> {
        let key = if request.method() == Method::GET && !self.ttl.is_zero() {
            Self::cache_key(&request)
        } else {
            None
        };
        let Some(key) = key else {
            let mut response = self.inner.forward(request).await?;
            response.extensions_mut().insert(CacheState::NotApplicable);
            return Ok(response);
        };

        if let Some(mut response) = self.lookup(&key).await {
            response.extensions_mut().insert(CacheState::Hit);
            return Ok(response);
        }

        let response = self.inner.forward(request).await?;
        let mut response = if response.status() == StatusCode::OK {
            self.store(&key, response).await?
        } else {
            response
        };
        response.extensions_mut().insert(CacheState::Miss);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use crate::transform::AuthProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        status: StatusCode,
        body: fn(usize) -> Body,
    }

    #[async_trait]
    impl Upstream for Counting {
        async fn forward(&self, _request: Request) -> Result<Response, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut response = Response::new((self.body)(n));
            *response.status_mut() = self.status;
            response
                .headers_mut()
                .insert("content-type", HeaderValue::from_static("text/plain"));
            Ok(response)
        }
    }

    fn numbered(n: usize) -> Body {
        Body::from(format!("call {n}"))
    }

    fn oversized(_: usize) -> Body {
        Body::from(vec![b'x'; MAX_BODY_BYTES + 1])
    }

    fn streamed(_: usize) -> Body {
        let chunks = vec![Ok::<_, std::io::Error>(axum::body::Bytes::from_static(b"chunk"))];
        Body::from_stream(futures::stream::iter(chunks))
    }

    /// Backend that times out on every call.
    struct Unreachable;

    #[async_trait]
    impl CacheProvider for Unreachable {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Timeout)
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Timeout)
        }

        async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Timeout)
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Timeout)
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    fn setup_with(
        status: StatusCode,
        body: fn(usize) -> Body,
        cache: Arc<dyn CacheProvider>,
    ) -> (Arc<Counting>, CachingUpstream) {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            status,
            body,
        });
        let caching = CachingUpstream::new(inner.clone(), cache, Duration::from_secs(30));
        (inner, caching)
    }

    fn setup(status: StatusCode) -> (Arc<Counting>, CachingUpstream) {
        setup_with(status, numbered, Arc::new(MemoryCache::new(64)))
    }

    fn claims(issuer: Option<&str>, user_id: Option<&str>) -> CanonicalClaimSet {
        CanonicalClaimSet {
            user_id: user_id.map(str::to_string),
            email: None,
            name: None,
            auth_provider: AuthProvider::Unknown,
            original_issuer: issuer.map(str::to_string),
            scopes: vec![],
            roles: vec![],
        }
    }

    fn get_as(path: &str, caller: CanonicalClaimSet) -> Request {
        let mut request = axum::http::Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(caller);
        request
    }

    fn get(path: &str) -> Request {
        get_as(path, claims(Some("https://tenant.auth0.com/"), Some("auth0|abc")))
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let (inner, caching) = setup(StatusCode::OK);

        let first = caching.forward(get("/products")).await.unwrap();
        assert_eq!(first.extensions().get::<CacheState>(), Some(&CacheState::Miss));
        assert_eq!(body(first).await, "call 1");

        let second = caching.forward(get("/products")).await.unwrap();
        assert_eq!(second.extensions().get::<CacheState>(), Some(&CacheState::Hit));
        assert_eq!(second.headers()["content-type"], "text/plain");
        assert_eq!(body(second).await, "call 1");

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_ok_responses_are_not_cached() {
        let (inner, caching) = setup(StatusCode::NOT_FOUND);
        caching.forward(get("/missing")).await.unwrap();
        let again = caching.forward(get("/missing")).await.unwrap();
        assert_eq!(again.extensions().get::<CacheState>(), Some(&CacheState::Miss));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn writes_bypass_the_cache() {
        let (inner, caching) = setup(StatusCode::OK);
        let post = || {
            let mut request = get("/orders");
            *request.method_mut() = Method::POST;
            request
        };
        let response = caching.forward(post()).await.unwrap();
        assert_eq!(
            response.extensions().get::<CacheState>(),
            Some(&CacheState::NotApplicable)
        );
        caching.forward(post()).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn keys_are_scoped_per_issuer_and_user() {
        let key = |issuer, user| {
            CachingUpstream::cache_key(&get_as("/me?x=1", claims(issuer, user)))
        };

        assert_eq!(key(None, None), None);
        assert_eq!(key(Some("https://accounts.google.com"), None), None);
        let unauthenticated = axum::http::Request::builder()
            .uri("/me")
            .body(Body::empty())
            .unwrap();
        assert_eq!(CachingUpstream::cache_key(&unauthenticated), None);

        let google = key(Some("https://accounts.google.com"), Some("123")).unwrap();
        let generic = key(Some("https://idp.example.com"), Some("123")).unwrap();
        assert_ne!(google, generic);
        assert!(google.ends_with(":/me?x=1"));

        // Separators inside claim values cannot shift the boundaries.
        assert_ne!(
            key(Some("https://a"), Some("b:c")),
            key(Some("https://a:b"), Some("c"))
        );
    }

    #[tokio::test]
    async fn callers_without_user_id_are_never_cached() {
        let (inner, caching) = setup(StatusCode::OK);
        let anonymous = || get_as("/me", claims(Some("https://tenant.auth0.com/"), None));

        let first = caching.forward(anonymous()).await.unwrap();
        assert_eq!(
            first.extensions().get::<CacheState>(),
            Some(&CacheState::NotApplicable)
        );
        let second = caching.forward(anonymous()).await.unwrap();
        assert_eq!(body(second).await, "call 2");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_body_passes_through_uncached() {
        let (inner, caching) =
            setup_with(StatusCode::OK, oversized, Arc::new(MemoryCache::new(4)));

        let response = caching.forward(get("/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.extensions().get::<CacheState>(), Some(&CacheState::Miss));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), MAX_BODY_BYTES + 1);

        caching.forward(get("/export")).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn streamed_body_passes_through_uncached() {
        let (inner, caching) = setup_with(StatusCode::OK, streamed, Arc::new(MemoryCache::new(4)));

        let response = caching.forward(get("/feed")).await.unwrap();
        assert_eq!(body(response).await, "chunk");
        caching.forward(get("/feed")).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn backend_failures_degrade_to_miss() {
        let (inner, caching) = setup_with(StatusCode::OK, numbered, Arc::new(Unreachable));

        let response = caching.forward(get("/products")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.extensions().get::<CacheState>(), Some(&CacheState::Miss));
        assert_eq!(body(response).await, "call 1");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
