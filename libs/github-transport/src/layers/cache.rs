//! Conditional-request cache.
//!
//! Successful `GET`/`HEAD` responses that carry a validator (`ETag` or
//! `Last-Modified`) are stored per [`CacheKey`]. The next identical request is
//! sent with `If-None-Match`/`If-Modified-Since`; a `304 Not Modified` answer
//! is turned back into the stored response. Any other method invalidates every
//! entry stored for its URI.

use crate::config::{CacheConfig, is_cacheable_method};
use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use http::header::{
    CONTENT_ENCODING, CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, TRANSFER_ENCODING,
};
use http::{Method, Request, Response, StatusCode};
use http_body::Frame;
use http_body_util::{BodyExt, BodyStream, Full, StreamBody};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Identity of a cacheable request.
///
/// A non-empty request body contributes its SHA-256 digest, so two requests
/// that differ only in body never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    uri: String,
    body_digest: Option<String>,
}

impl CacheKey {
    #[must_use]
    pub fn new(method: Method, uri: &http::Uri, body: &[u8]) -> Self {
        let body_digest = (!body.is_empty()).then(|| hex::encode(Sha256::digest(body)));
        Self {
            method,
            uri: uri.to_string(),
            body_digest,
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Validator token taken from a stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// Sent back as `If-None-Match`
    ETag(HeaderValue),
    /// Sent back as `If-Modified-Since`
    LastModified(HeaderValue),
}

impl Validator {
    /// `ETag` wins over `Last-Modified`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(ETAG)
            .map(|v| Self::ETag(v.clone()))
            .or_else(|| headers.get(LAST_MODIFIED).map(|v| Self::LastModified(v.clone())))
    }

    /// The conditional request header carrying this validator.
    #[must_use]
    pub fn request_header(&self) -> HeaderName {
        match self {
            Self::ETag(_) => IF_NONE_MATCH,
            Self::LastModified(_) => IF_MODIFIED_SINCE,
        }
    }

    #[must_use]
    pub fn value(&self) -> &HeaderValue {
        match self {
            Self::ETag(v) | Self::LastModified(v) => v,
        }
    }
}

/// Stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub validator: Validator,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CacheEntry {
    /// Rebuild the stored response, overlaid with the headers of the `304`
    /// that confirmed it.
    fn revalidated(&self, not_modified: &HeaderMap) -> (Self, Response<ResponseBody>) {
        let mut headers = self.headers.clone();
        for name in not_modified.keys() {
            if is_framing_header(name) {
                continue;
            }
            headers.remove(name);
            for value in not_modified.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let refreshed = Self {
            validator: Validator::from_headers(not_modified).unwrap_or_else(|| self.validator.clone()),
            status: self.status,
            headers: headers.clone(),
            body: self.body.clone(),
        };

        let mut resp = Response::new(full_body(self.body.clone()));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = headers;
        (refreshed, resp)
    }
}

/// Headers describing the 304's own (empty) framing, never the cached body's.
fn is_framing_header(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONTENT_ENCODING
}

/// Entry store owned by one [`ConditionalCacheLayer`].
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Drop every entry stored for `uri`, whatever its method or body.
    /// Returns how many entries were removed.
    #[must_use = "returns the number of entries removed"]
    pub fn invalidate_uri(&self, uri: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.uri != uri);
        before.saturating_sub(self.entries.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tower layer adding `ETag`/`Last-Modified` revalidation in front of the network.
#[derive(Clone, Debug)]
pub struct ConditionalCacheLayer {
    cache: Arc<ResponseCache>,
    max_entry_bytes: usize,
}

impl ConditionalCacheLayer {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new()),
            max_entry_bytes: config.max_entry_bytes,
        }
    }

    /// Shared handle to this layer's entries.
    #[must_use]
    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }
}

impl<S> Layer<S> for ConditionalCacheLayer {
    type Service = ConditionalCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConditionalCacheService {
            inner,
            cache: Arc::clone(&self.cache),
            max_entry_bytes: self.max_entry_bytes,
        }
    }
}

/// Service created by [`ConditionalCacheLayer`].
#[derive(Clone, Debug)]
pub struct ConditionalCacheService<S> {
    inner: S,
    cache: Arc<ResponseCache>,
    max_entry_bytes: usize,
}

impl<S> Service<Request<Full<Bytes>>> for ConditionalCacheService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let cache = Arc::clone(&self.cache);
        let max_entry_bytes = self.max_entry_bytes;

        if !is_cacheable_method(req.method()) {
            let uri = req.uri().clone();
            let method = req.method().clone();
            invalidate(&cache, &uri, &method);
            return Box::pin(async move {
                let result = inner.call(req).await;
                invalidate(&cache, &uri, &method);
                result
            });
        }

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            let key = CacheKey::new(parts.method.clone(), &parts.uri, &body);
            let path = parts.uri.path().to_owned();

            let caller_conditional = parts.headers.contains_key(IF_NONE_MATCH)
                || parts.headers.contains_key(IF_MODIFIED_SINCE);
            let cached = if caller_conditional {
                None
            } else {
                cache.get(&key)
            };
            if let Some(entry) = &cached {
                parts
                    .headers
                    .insert(entry.validator.request_header(), entry.validator.value().clone());
            }

            let resp = inner.call(Request::from_parts(parts, Full::new(body))).await?;

            if resp.status() == StatusCode::NOT_MODIFIED {
                let Some(entry) = cached else {
                    return Ok(resp);
                };
                tracing::trace!(path = %path, "cache: not modified, replaying stored response");
                let (refreshed, mut replay) = entry.revalidated(resp.headers());
                *replay.version_mut() = resp.version();
                cache.insert(key, refreshed);
                return Ok(replay);
            }

            if !resp.status().is_success() {
                return Ok(resp);
            }

            let Some(validator) = Validator::from_headers(resp.headers()) else {
                cache.remove(&key);
                return Ok(resp);
            };
            if announced_length(resp.headers()).is_some_and(|len| len > max_entry_bytes as u64) {
                cache.remove(&key);
                return Ok(resp);
            }

            let (parts, body) = resp.into_parts();
            match buffer_body(body, max_entry_bytes).await {
                Ok(bytes) => {
                    tracing::trace!(path = %path, bytes = bytes.len(), "cache: storing response");
                    cache.insert(
                        key,
                        CacheEntry {
                            validator,
                            status: parts.status,
                            headers: parts.headers.clone(),
                            body: bytes.clone(),
                        },
                    );
                    Ok(Response::from_parts(parts, full_body(bytes)))
                }
                Err(resumed) => {
                    cache.remove(&key);
                    Ok(Response::from_parts(parts, resumed))
                }
            }
        })
    }
}

fn invalidate(cache: &ResponseCache, uri: &http::Uri, method: &Method) {
    let removed = cache.invalidate_uri(&uri.to_string());
    if removed > 0 {
        tracing::trace!(path = %uri.path(), method = %method, removed, "cache: invalidated entries");
    }
}

fn announced_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn full_body(bytes: Bytes) -> ResponseBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Collect a body for storage.
///
/// When the body turns out larger than `limit`, carries trailers, or fails
/// mid-way, the bytes already read are handed back in front of whatever the
/// caller would have read next (the rest of the body, or the error).
async fn buffer_body(mut body: ResponseBody, limit: usize) -> Result<Bytes, ResponseBody> {
    let mut collected = Vec::new();
    loop {
        match body.frame().await {
            None => return Ok(Bytes::from(collected)),
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => {
                    collected.extend_from_slice(&data);
                    if collected.len() > limit {
                        return Err(resume(collected, None, Some(body)));
                    }
                }
                Err(trailers) => return Err(resume(collected, Some(Ok(trailers)), Some(body))),
            },
            Some(Err(e)) => {
                tracing::trace!(error = %e, "cache: body read failed, not caching");
                return Err(resume(collected, Some(Err(e)), None));
            }
        }
    }
}

fn resume(
    prefix: Vec<u8>,
    next: Option<Result<Frame<Bytes>, BoxError>>,
    rest: Option<ResponseBody>,
) -> ResponseBody {
    let head = (!prefix.is_empty()).then(|| Ok(Frame::data(Bytes::from(prefix))));
    let frames = stream::iter(head.into_iter().chain(next))
        .chain(stream::iter(rest.map(BodyStream::new)).flatten());
    BodyExt::boxed(StreamBody::new(frames))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// In-memory origin answering conditional requests the way GitHub does.
    #[derive(Clone, Default)]
    struct Origin {
        state: Arc<Mutex<OriginState>>,
    }

    #[derive(Default)]
    struct OriginState {
        etag: Option<&'static str>,
        last_modified: Option<&'static str>,
        body: &'static str,
        remaining: u32,
        seen: Vec<(Method, HeaderMap)>,
    }

    impl Origin {
        fn with_etag(etag: &'static str, body: &'static str) -> Self {
            let origin = Self::default();
            {
                let mut state = origin.state.lock().unwrap();
                state.etag = Some(etag);
                state.body = body;
                state.remaining = 5000;
            }
            origin
        }

        fn seen(&self) -> Vec<(Method, HeaderMap)> {
            self.state.lock().unwrap().seen.clone()
        }
    }

    impl Service<Request<Full<Bytes>>> for Origin {
        type Response = Response<ResponseBody>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut state = self.state.lock().unwrap();
            state.seen.push((req.method().clone(), req.headers().clone()));
            state.remaining -= 1;

            let fresh = match (state.etag, state.last_modified) {
                (Some(etag), _) => req.headers().get(IF_NONE_MATCH).is_none_or(|v| v != etag),
                (None, Some(date)) => req
                    .headers()
                    .get(IF_MODIFIED_SINCE)
                    .is_none_or(|v| v != date),
                (None, None) => true,
            };

            let mut builder = Response::builder()
                .header("x-ratelimit-remaining", state.remaining.to_string());
            if let Some(etag) = state.etag {
                builder = builder.header(ETAG, etag);
            }
            if let Some(date) = state.last_modified {
                builder = builder.header(LAST_MODIFIED, date);
            }
            let resp = if fresh {
                builder
                    .status(StatusCode::OK)
                    .header(CONTENT_LENGTH, state.body.len())
                    .body(full_body(Bytes::from_static(state.body.as_bytes())))
            } else {
                builder
                    .status(StatusCode::NOT_MODIFIED)
                    .body(full_body(Bytes::new()))
            };
            std::future::ready(Ok(resp.unwrap()))
        }
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Full::default())
            .unwrap()
    }

    fn layer() -> ConditionalCacheLayer {
        ConditionalCacheLayer::new(&CacheConfig::default())
    }

    async fn body_of(resp: Response<ResponseBody>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    const REPO: &str = "https://api.github.com/repos/o/r";

    #[tokio::test]
    async fn test_second_get_revalidates_and_replays_body() {
        let origin = Origin::with_etag("\"v1\"", r#"{"name":"r"}"#);
        let svc = layer().layer(origin.clone());

        let first = svc.clone().oneshot(get(REPO)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first_body = body_of(first).await;

        let second = svc.clone().oneshot(get(REPO)).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_of(second).await, first_body);

        let seen = origin.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].1.get(IF_NONE_MATCH).is_none());
        assert_eq!(seen[1].1[IF_NONE_MATCH], "\"v1\"");
    }

    #[tokio::test]
    async fn test_replay_surfaces_headers_of_not_modified() {
        let origin = Origin::with_etag("\"v1\"", "payload");
        let svc = layer().layer(origin.clone());

        let first = svc.clone().oneshot(get(REPO)).await.unwrap();
        assert_eq!(first.headers()["x-ratelimit-remaining"], "4999");
        let second = svc.clone().oneshot(get(REPO)).await.unwrap();

        assert_eq!(second.headers()["x-ratelimit-remaining"], "4998");
        assert_eq!(second.headers()[CONTENT_LENGTH], "7");
        assert_eq!(body_of(second).await, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_refreshed_validator_is_stored() {
        let cache = layer();
        let key = CacheKey::new(Method::GET, &REPO.parse().unwrap(), b"");
        let entry = CacheEntry {
            validator: Validator::ETag(HeaderValue::from_static("\"old\"")),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"x"),
        };
        let mut not_modified = HeaderMap::new();
        not_modified.insert(ETAG, HeaderValue::from_static("\"new\""));

        let (refreshed, _) = entry.revalidated(&not_modified);
        cache.cache().insert(key.clone(), refreshed);

        let stored = cache.cache().get(&key).unwrap();
        assert_eq!(stored.validator.value(), "\"new\"");
        assert_eq!(stored.headers[ETAG], "\"new\"");
    }

    #[tokio::test]
    async fn test_mutation_invalidates_uri() {
        let origin = Origin::with_etag("\"v1\"", "payload");
        let layer = layer();
        let svc = layer.layer(origin.clone());

        svc.clone().oneshot(get(REPO)).await.unwrap();
        assert_eq!(layer.cache().len(), 1);

        let patch = Request::builder()
            .method(Method::PATCH)
            .uri(REPO)
            .body(Full::new(Bytes::from_static(b"{\"private\":true}")))
            .unwrap();
        svc.clone().oneshot(patch).await.unwrap();
        assert!(layer.cache().is_empty());

        svc.clone().oneshot(get(REPO)).await.unwrap();
        let seen = origin.seen();
        assert_eq!(seen[1].0, Method::PATCH);
        assert!(seen[1].1.get(IF_NONE_MATCH).is_none());
        assert!(seen[2].1.get(IF_NONE_MATCH).is_none());
    }

    #[tokio::test]
    async fn test_caller_conditional_passes_not_modified_through() {
        let origin = Origin::with_etag("\"v1\"", "payload");
        let layer = layer();
        let svc = layer.layer(origin.clone());

        let req = Request::builder()
            .uri(REPO)
            .header(IF_NONE_MATCH, "\"v1\"")
            .body(Full::default())
            .unwrap();
        let resp = svc.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(body_of(resp).await.is_empty());
        assert!(layer.cache().is_empty());
    }

    #[tokio::test]
    async fn test_last_modified_used_without_etag() {
        let origin = Origin::default();
        {
            let mut state = origin.state.lock().unwrap();
            state.last_modified = Some("Wed, 21 Oct 2015 07:28:00 GMT");
            state.body = "dated";
            state.remaining = 10;
        }
        let svc = layer().layer(origin.clone());

        svc.clone().oneshot(get(REPO)).await.unwrap();
        let second = svc.clone().oneshot(get(REPO)).await.unwrap();

        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_of(second).await, Bytes::from_static(b"dated"));
        assert_eq!(
            origin.seen()[1].1[IF_MODIFIED_SINCE],
            "Wed, 21 Oct 2015 07:28:00 GMT"
        );
    }

    #[tokio::test]
    async fn test_response_without_validator_not_stored() {
        let origin = Origin::default();
        {
            let mut state = origin.state.lock().unwrap();
            state.body = "plain";
            state.remaining = 10;
        }
        let layer = layer();
        let svc = layer.layer(origin);

        svc.oneshot(get(REPO)).await.unwrap();
        assert!(layer.cache().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_body_not_stored() {
        let origin = Origin::with_etag("\"big\"", "0123456789abcdef");
        let layer = ConditionalCacheLayer::new(&CacheConfig {
            enabled: true,
            max_entry_bytes: 8,
        });
        let svc = layer.layer(origin);

        let resp = svc.oneshot(get(REPO)).await.unwrap();
        assert_eq!(body_of(resp).await, Bytes::from_static(b"0123456789abcdef"));
        assert!(layer.cache().is_empty());
    }

    #[tokio::test]
    async fn test_unannounced_oversized_body_streams_through() {
        let chunks: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"01234"))),
            Ok(Frame::data(Bytes::from_static(b"56789"))),
            Ok(Frame::data(Bytes::from_static(b"abcde"))),
        ];
        let body: ResponseBody = BodyExt::boxed(StreamBody::new(stream::iter(chunks)));
        let mut resp = Response::new(body);
        resp.headers_mut().insert(ETAG, HeaderValue::from_static("\"s\""));

        let resumed = buffer_body(resp.into_body(), 6).await.unwrap_err();
        assert_eq!(
            body_of(Response::new(resumed)).await,
            Bytes::from_static(b"0123456789abcde")
        );
    }

    #[tokio::test]
    async fn test_body_error_is_reemitted_and_not_cached() {
        #[derive(Clone)]
        struct Broken;

        impl Service<Request<Full<Bytes>>> for Broken {
            type Response = Response<ResponseBody>;
            type Error = HttpError;
            type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

            fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _: Request<Full<Bytes>>) -> Self::Future {
                let frames: Vec<Result<Frame<Bytes>, BoxError>> = vec![
                    Ok(Frame::data(Bytes::from_static(b"partial"))),
                    Err("connection reset".into()),
                ];
                let body = StreamBody::new(stream::iter(frames));
                let mut resp = Response::new(BodyExt::boxed(body));
                resp.headers_mut().insert(ETAG, HeaderValue::from_static("\"e\""));
                std::future::ready(Ok(resp))
            }
        }

        let layer = layer();
        let resp = layer.layer(Broken).oneshot(get(REPO)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut body = resp.into_body();
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(first, Bytes::from_static(b"partial"));
        let err = body.frame().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert!(layer.cache().is_empty());
    }

    #[test]
    fn test_cache_key_includes_body_digest() {
        let uri: http::Uri = "https://api.github.com/graphql".parse().unwrap();
        let empty = CacheKey::new(Method::GET, &uri, b"");
        let a = CacheKey::new(Method::GET, &uri, b"{\"q\":1}");
        let b = CacheKey::new(Method::GET, &uri, b"{\"q\":2}");

        assert_ne!(a, b);
        assert_ne!(a, empty);
        assert_eq!(a, CacheKey::new(Method::GET, &uri, b"{\"q\":1}"));
        assert_ne!(empty, CacheKey::new(Method::HEAD, &uri, b""));
    }

    #[test]
    fn test_invalidate_uri_drops_all_variants() {
        let cache = ResponseCache::new();
        let uri: http::Uri = REPO.parse().unwrap();
        let other: http::Uri = "https://api.github.com/repos/o/other".parse().unwrap();
        let entry = CacheEntry {
            validator: Validator::ETag(HeaderValue::from_static("\"x\"")),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        cache.insert(CacheKey::new(Method::GET, &uri, b""), entry.clone());
        cache.insert(CacheKey::new(Method::HEAD, &uri, b""), entry.clone());
        cache.insert(CacheKey::new(Method::GET, &uri, b"q"), entry.clone());
        cache.insert(CacheKey::new(Method::GET, &other, b""), entry);

        assert_eq!(cache.invalidate_uri(REPO), 3);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_separate_layers_do_not_share_entries() {
        let origin = Origin::with_etag("\"v1\"", "payload");
        let first = layer();
        let second = layer();

        first.layer(origin.clone()).oneshot(get(REPO)).await.unwrap();
        second.layer(origin.clone()).oneshot(get(REPO)).await.unwrap();

        assert!(origin.seen()[1].1.get(IF_NONE_MATCH).is_none());
    }
}
