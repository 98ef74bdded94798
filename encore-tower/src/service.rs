use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use encore::ActionResult;
use encore_backend::CacheBackend;
use encore_http::body::BoxError;
use encore_http::{CacheResult, PersistenceFlags, ReplayBody, ResponseCapture};
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body::Body as HttpBody;
use tower::Service;
use tracing::{debug, warn};

use crate::error::IdempotencyError;
use crate::layer::Shared;

/// Service produced by [`Idempotency`](crate::Idempotency).
pub struct IdempotencyService<S, B> {
    inner: S,
    shared: Arc<Shared<B>>,
}

impl<S, B> IdempotencyService<S, B> {
    pub(crate) fn new(inner: S, shared: Arc<Shared<B>>) -> Self {
        Self { inner, shared }
    }
}

impl<S, B> Clone for IdempotencyService<S, B>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, B> fmt::Debug for IdempotencyService<S, B>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyService")
            .field("inner", &self.inner)
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl<S, B, ReqBody, ResBody> Service<Request<ReqBody>> for IdempotencyService<S, B>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
    B: CacheBackend + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError> + Send,
{
    type Response = Response<ReplayBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The instance polled ready is the one that serves this request.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let shared = Arc::clone(&self.shared);
        Box::pin(orchestrate(shared, inner, req))
    }
}

async fn orchestrate<S, B, ReqBody, ResBody>(
    shared: Arc<Shared<B>>,
    mut inner: S,
    req: Request<ReqBody>,
) -> Result<Response<ReplayBody<ResBody>>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send,
    S::Future: Send,
    S::Error: Into<BoxError> + Send,
    B: CacheBackend,
    ReqBody: Send,
    ResBody: HttpBody + Send,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError> + Send,
{
    let (parts, body) = req.into_parts();

    let key = match shared.key_extractor.extract(&parts) {
        Ok(key) => key,
        Err(err) => {
            debug!(middleware = %shared.name, error = %err, "idempotency key rejected");
            let err = IdempotencyError::from(err);
            let response = shared.client_error_handler.handle(&parts, &err);
            return Ok(ReplayBody::from_response(response));
        }
    };

    if key.is_empty() {
        debug!(middleware = %shared.name, "no idempotency key, passing through");
        let response = inner.call(Request::from_parts(parts, body)).await?;
        return Ok(response.map(ReplayBody::Passthrough));
    }

    let cache_key = shared.actor.key(&key);
    let flags = PersistenceFlags {
        body: true,
        ..shared.responder.persistence()
    };
    let request = Request::from_parts(parts.clone(), body);
    let executed = AtomicBool::new(false);
    let ran = &executed;

    let action = move || async move {
        ran.store(true, Ordering::Release);
        let response = inner
            .call(request)
            .await
            .map_err(Into::<BoxError>::into)?;
        let captured = ResponseCapture::capture(response).await?;
        Ok::<_, BoxError>(ActionResult::cache(captured.into_captured(flags)))
    };

    match shared.actor.execute(&cache_key, action).await {
        Ok(captured) => {
            let from_cache = !executed.load(Ordering::Acquire);
            debug!(
                middleware = %shared.name,
                key = %cache_key,
                from_cache,
                status = captured.status_code(),
                "idempotent request served"
            );
            let response = shared
                .responder
                .respond(&parts, CacheResult::new(from_cache, captured));
            Ok(ReplayBody::from_response(response))
        }
        Err(err) => {
            warn!(middleware = %shared.name, key = %cache_key, error = %err, "idempotent request failed");
            let err = IdempotencyError::from(err);
            let response = shared.server_error_handler.handle(&parts, &err);
            Ok(ReplayBody::from_response(response))
        }
    }
}
