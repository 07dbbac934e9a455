use crate::error::HttpError;
use crate::secret::SecretString;
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderValue, Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that sets `Authorization: Bearer <token>` on every request.
///
/// Sits beneath the conditional cache, so revalidation requests and retried
/// attempts carry the token too. An `Authorization` header supplied by the
/// caller is replaced.
#[derive(Clone, Debug)]
pub struct BearerAuthLayer {
    token: Arc<SecretString>,
    header_name: HeaderName,
}

impl BearerAuthLayer {
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token: Arc::new(token),
            header_name: AUTHORIZATION,
        }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            token: Arc::clone(&self.token),
            header_name: self.header_name.clone(),
        }
    }
}

/// Service created by [`BearerAuthLayer`].
#[derive(Clone, Debug)]
pub struct BearerAuthService<S> {
    inner: S,
    token: Arc<SecretString>,
    header_name: HeaderName,
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let raw = zeroize::Zeroizing::new(format!("Bearer {}", self.token.expose()));
        let mut value = match HeaderValue::from_str(&raw) {
            Ok(v) => v,
            Err(e) => return Box::pin(async { Err(HttpError::InvalidHeaderValue(e)) }),
        };
        value.set_sensitive(true);
        req.headers_mut().insert(self.header_name.clone(), value);

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Returns the received `Authorization` header in the response headers.
    #[derive(Clone)]
    struct CaptureAuth;

    impl Service<Request<Full<Bytes>>> for CaptureAuth {
        type Response = Response<Full<Bytes>>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut resp = Response::new(Full::new(Bytes::new()));
            *resp.status_mut() = StatusCode::OK;
            if let Some(v) = req.headers().get(AUTHORIZATION) {
                resp.headers_mut().insert(AUTHORIZATION, v.clone());
            }
            std::future::ready(Ok(resp))
        }
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .uri("https://api.github.com/user")
            .body(Full::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_injects_sensitive_bearer_header() {
        let svc = BearerAuthLayer::new(SecretString::new("ghp_abc123")).layer(CaptureAuth);
        let resp = svc.oneshot(request()).await.unwrap();

        let value = &resp.headers()[AUTHORIZATION];
        assert_eq!(value, "Bearer ghp_abc123");
        assert!(value.is_sensitive());
    }

    #[tokio::test]
    async fn test_replaces_caller_authorization() {
        let svc = BearerAuthLayer::new(SecretString::new("ghp_abc123")).layer(CaptureAuth);
        let mut req = request();
        req.headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("token old"));

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[AUTHORIZATION], "Bearer ghp_abc123");
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_before_sending() {
        let svc = BearerAuthLayer::new(SecretString::new("bad\ntoken")).layer(CaptureAuth);
        let err = svc.oneshot(request()).await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderValue(_)));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let layer = BearerAuthLayer::new(SecretString::new("ghp_abc123"));
        assert!(!format!("{layer:?}").contains("ghp_abc123"));
    }
}
