#![allow(dead_code)]

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use encore_backend::{Backend, BackendError, BackendResult, CacheBackend, DeleteStatus};
use encore_core::{CacheKey, CacheValue, Raw};
use encore_tower::ReplayBody;
use futures::future::BoxFuture;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use tower::{Service, ServiceExt};

pub const KEY_HEADER: &str = "idempotency-key";
pub const REPLAY_HEADER: &str = "idempotent-replayed";

/// Creates a payment: answers `201 {"id": n}` where `n` counts executions.
#[derive(Debug, Clone, Default)]
pub struct PaymentHandler {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl PaymentHandler {
    pub fn slow(delay: Duration) -> Self {
        Self {
            calls: Arc::default(),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Service<Request<Full<Bytes>>> for PaymentHandler {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<Full<Bytes>>) -> Self::Future {
        let calls = Arc::clone(&self.calls);
        let delay = self.delay;
        Box::pin(async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let response = Response::builder()
                .status(StatusCode::CREATED)
                .header("content-type", "application/json")
                .header("x-request-id", format!("req-{n}"))
                .body(Full::new(Bytes::from(format!("{{\"id\":{n}}}"))))
                .unwrap();
            Ok(response)
        })
    }
}

pub fn request(key: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::post("/payments");
    if let Some(key) = key {
        builder = builder.header(KEY_HEADER, key);
    }
    builder
        .body(Full::new(Bytes::from_static(b"{\"amount\":100}")))
        .unwrap()
}

#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn replayed(&self) -> bool {
        self.header(REPLAY_HEADER) == Some("true")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send<S, E>(service: S, req: Request<Full<Bytes>>) -> Reply
where
    S: Service<Request<Full<Bytes>>, Response = Response<ReplayBody<Full<Bytes>>>, Error = E>,
    E: std::fmt::Debug,
{
    let response = service.oneshot(req).await.unwrap();
    let (parts, body) = response.into_parts();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

/// A backend whose storage is unreachable.
#[derive(Debug, Default)]
pub struct UnreachableBackend;

fn unreachable_storage() -> BackendError {
    BackendError::ConnectionError(Box::new(io::Error::other("storage unreachable")))
}

#[async_trait]
impl Backend for UnreachableBackend {
    async fn read(&self, _key: &CacheKey) -> BackendResult<Option<CacheValue<Raw>>> {
        Err(unreachable_storage())
    }

    async fn write(
        &self,
        _key: &CacheKey,
        _value: CacheValue<Raw>,
        _ttl: Option<Duration>,
    ) -> BackendResult<()> {
        Err(unreachable_storage())
    }

    async fn remove(&self, _key: &CacheKey) -> BackendResult<DeleteStatus> {
        Err(unreachable_storage())
    }
}

impl CacheBackend for UnreachableBackend {}
