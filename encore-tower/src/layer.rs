use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use encore::Actor;
use encore_backend::CacheBackend;
use encore_http::{
    CachedResponder, CapturedResponse, ErrorHandler, HeaderKeyExtractor, JsonErrorHandler,
    KeyExtractor, Responder,
};
use http::HeaderName;
use smol_str::SmolStr;
use tower::Layer;
use tracing::warn;

use crate::config::IdempotencyConfig;
use crate::error::ConfigError;
use crate::service::IdempotencyService;

/// Everything a request needs, shared by every service the layer produces.
pub(crate) struct Shared<B> {
    pub(crate) name: SmolStr,
    pub(crate) actor: Actor<CapturedResponse, B>,
    pub(crate) key_extractor: Box<dyn KeyExtractor>,
    pub(crate) client_error_handler: Box<dyn ErrorHandler>,
    pub(crate) server_error_handler: Box<dyn ErrorHandler>,
    pub(crate) responder: Box<dyn Responder>,
}

/// Tower layer deduplicating requests by idempotency key.
///
/// Cloning is cheap. Clones share one in-process coalescing map, so every
/// route wrapped by clones of the same layer coalesces on the same keys.
pub struct Idempotency<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for Idempotency<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B> fmt::Debug for Idempotency<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Idempotency")
            .field("name", &self.shared.name)
            .field("actor", &self.shared.actor)
            .finish_non_exhaustive()
    }
}

impl Idempotency<NotSet> {
    /// Starts building a layer named `name`.
    pub fn builder(name: impl Into<SmolStr>) -> IdempotencyBuilder<NotSet> {
        IdempotencyBuilder::new(name)
    }
}

impl<B> Idempotency<B>
where
    B: CacheBackend + 'static,
{
    /// Builds a layer from `config` on top of `backend`.
    pub fn from_config(config: &IdempotencyConfig, backend: B) -> Result<Self, ConfigError> {
        let mut builder = IdempotencyBuilder::new(config.name.as_str())
            .backend(backend)
            .key_extractor(config.key_extractor()?)
            .responder(config.replay.responder()?);
        if let Some(ttl) = config.ttl {
            builder = builder.ttl(ttl);
        }
        if let Some(timeout) = config.wait_timeout {
            builder = builder.wait_timeout(timeout);
        }
        Ok(builder.build())
    }

    /// The layer's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The actor storing responses. Useful to invalidate keys.
    pub fn actor(&self) -> &Actor<CapturedResponse, B> {
        &self.shared.actor
    }
}

impl<S, B> Layer<S> for Idempotency<B> {
    type Service = IdempotencyService<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        IdempotencyService::new(inner, Arc::clone(&self.shared))
    }
}

/// Marker for a builder field that has not been set yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotSet;

/// Builder for [`Idempotency`]. A backend must be set before building.
pub struct IdempotencyBuilder<B> {
    name: SmolStr,
    backend: B,
    ttl: Option<Duration>,
    wait_timeout: Option<Duration>,
    key_extractor: Option<Box<dyn KeyExtractor>>,
    client_error_handler: Option<Box<dyn ErrorHandler>>,
    server_error_handler: Option<Box<dyn ErrorHandler>>,
    responder: Option<Box<dyn Responder>>,
}

impl IdempotencyBuilder<NotSet> {
    /// A builder with defaults for everything but the backend.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            backend: NotSet,
            ttl: None,
            wait_timeout: None,
            key_extractor: None,
            client_error_handler: None,
            server_error_handler: None,
            responder: None,
        }
    }
}

impl<B> IdempotencyBuilder<B> {
    /// Where responses are stored.
    pub fn backend<NB>(self, backend: NB) -> IdempotencyBuilder<NB>
    where
        NB: CacheBackend,
    {
        IdempotencyBuilder {
            name: self.name,
            backend,
            ttl: self.ttl,
            wait_timeout: self.wait_timeout,
            key_extractor: self.key_extractor,
            client_error_handler: self.client_error_handler,
            server_error_handler: self.server_error_handler,
            responder: self.responder,
        }
    }

    /// Validity window of stored responses.
    pub fn ttl(self, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }

    /// Upper bound on waiting for a concurrent request with the same key.
    pub fn wait_timeout(self, timeout: Duration) -> Self {
        Self {
            wait_timeout: Some(timeout),
            ..self
        }
    }

    /// How keys are derived from requests. Defaults to the `Idempotency-Key` header.
    pub fn key_extractor(self, extractor: impl KeyExtractor + 'static) -> Self {
        Self {
            key_extractor: Some(Box::new(extractor)),
            ..self
        }
    }

    /// Reads the key from `header` instead of `Idempotency-Key`.
    pub fn key_header(self, header: HeaderName) -> Self {
        self.key_extractor(HeaderKeyExtractor::new(header))
    }

    /// Answers rejected keys. Defaults to a JSON `400 Bad Request`.
    pub fn client_error_handler(self, handler: impl ErrorHandler + 'static) -> Self {
        Self {
            client_error_handler: Some(Box::new(handler)),
            ..self
        }
    }

    /// Answers storage and handler failures. Defaults to a JSON `500 Internal Server Error`.
    pub fn server_error_handler(self, handler: impl ErrorHandler + 'static) -> Self {
        Self {
            server_error_handler: Some(Box::new(handler)),
            ..self
        }
    }

    /// Decides what is stored and how responses are written.
    /// Defaults to [`CachedResponder::new`].
    pub fn responder(self, responder: impl Responder + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..self
        }
    }
}

impl<B> IdempotencyBuilder<B>
where
    B: CacheBackend + 'static,
{
    /// Builds the layer.
    pub fn build(self) -> Idempotency<B> {
        let responder = self
            .responder
            .unwrap_or_else(|| Box::new(CachedResponder::new()));
        if !responder.persist_body() {
            warn!(
                middleware = %self.name,
                "responder opts out of storing the body, the body is stored regardless"
            );
        }

        let mut actor = Actor::new(format!("idempotency-{}", self.name), self.backend);
        if let Some(ttl) = self.ttl {
            actor = actor.with_ttl(ttl);
        }
        if let Some(timeout) = self.wait_timeout {
            actor = actor.with_wait_timeout(timeout);
        }

        Idempotency {
            shared: Arc::new(Shared {
                name: self.name,
                actor,
                key_extractor: self
                    .key_extractor
                    .unwrap_or_else(|| Box::new(HeaderKeyExtractor::default())),
                client_error_handler: self
                    .client_error_handler
                    .unwrap_or_else(|| Box::new(JsonErrorHandler::client())),
                server_error_handler: self
                    .server_error_handler
                    .unwrap_or_else(|| Box::new(JsonErrorHandler::server())),
                responder,
            }),
        }
    }
}
