//! Replay policies.
//!
//! A [`Responder`] is consulted twice per deduplicated request: once when the
//! handler's response is captured, to decide which fields are persisted, and once
//! at the end, to turn the [`CacheResult`] into what the client receives.

use bytes::Bytes;
use encore_core::{CacheResult, PersistenceFlags};
use http::request::Parts;
use http::{HeaderName, HeaderValue, Response, StatusCode};

/// Decides what is persisted and what is sent back.
pub trait Responder: Send + Sync {
    /// Persist the status code.
    fn persist_status(&self) -> bool;

    /// Persist the header map.
    fn persist_headers(&self) -> bool;

    /// Persist the body. Replays need the body, so the middleware persists it
    /// even when this returns `false`.
    fn persist_body(&self) -> bool {
        true
    }

    /// The three flags together.
    fn persistence(&self) -> PersistenceFlags {
        PersistenceFlags::new(
            self.persist_status(),
            self.persist_headers(),
            self.persist_body(),
        )
    }

    /// Builds the client-visible response.
    fn respond(&self, request: &Parts, result: CacheResult) -> Response<Bytes>;
}

/// Which captured headers a replay carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HeaderReplay {
    /// Every captured header.
    #[default]
    All,
    /// Only the listed names. An empty list replays no headers.
    Only(Vec<HeaderName>),
}

/// The default replay policy.
///
/// - fresh executions send every captured header; replays send every header
///   under [`HeaderReplay::All`] and only listed ones under [`HeaderReplay::Only`]
/// - a configured status override is sent on fresh and replayed responses alike,
///   and the real status is then not persisted
/// - the body is always sent as captured
///
/// ```
/// use encore_http::{CachedResponder, HeaderReplay, Responder};
/// use http::{HeaderName, StatusCode};
///
/// let responder = CachedResponder::new()
///     .headers(HeaderReplay::Only(vec![HeaderName::from_static("location")]))
///     .override_status(StatusCode::OK);
///
/// assert!(!responder.persist_status());
/// assert!(responder.persist_headers());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CachedResponder {
    override_status: Option<StatusCode>,
    headers: HeaderReplay,
    replay_header: Option<HeaderName>,
}

impl CachedResponder {
    /// Persists everything, no override, every header replayed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `status` instead of the handler's status.
    pub fn override_status(mut self, status: StatusCode) -> Self {
        self.override_status = Some(status);
        self
    }

    /// Which headers replays carry.
    pub fn headers(mut self, headers: HeaderReplay) -> Self {
        self.headers = headers;
        self
    }

    /// Marks replayed responses with `name: true`.
    pub fn replay_header(mut self, name: HeaderName) -> Self {
        self.replay_header = Some(name);
        self
    }
}

impl Responder for CachedResponder {
    fn persist_status(&self) -> bool {
        self.override_status.is_none()
    }

    fn persist_headers(&self) -> bool {
        match &self.headers {
            HeaderReplay::All => true,
            HeaderReplay::Only(names) => !names.is_empty(),
        }
    }

    fn respond(&self, _request: &Parts, result: CacheResult) -> Response<Bytes> {
        let CacheResult {
            from_cache,
            response: captured,
        } = result;

        let mut response = Response::new(captured.body().clone());
        *response.status_mut() = self
            .override_status
            .or_else(|| captured.status())
            .unwrap_or(StatusCode::OK);

        let headers = response.headers_mut();
        match &self.headers {
            HeaderReplay::Only(names) if from_cache => {
                for name in names {
                    for value in captured.headers().get_all(name) {
                        headers.append(name.clone(), value.clone());
                    }
                }
            }
            _ => headers.clone_from(captured.headers()),
        }

        if from_cache && let Some(name) = &self.replay_header {
            headers.insert(name.clone(), HeaderValue::from_static("true"));
        }

        response
    }
}

/// A [`Responder`] from a single function. Persists every field.
#[derive(Clone)]
pub struct ResponderFn<F> {
    f: F,
}

/// Wraps `f` into a [`Responder`].
///
/// ```
/// use bytes::Bytes;
/// use encore_http::{CacheResult, responder_fn};
/// use http::Response;
///
/// let responder = responder_fn(|_request, result: CacheResult| {
///     Response::new(result.response.body().clone())
/// });
/// ```
pub fn responder_fn<F>(f: F) -> ResponderFn<F>
where
    F: Fn(&Parts, CacheResult) -> Response<Bytes> + Send + Sync,
{
    ResponderFn { f }
}

impl<F> Responder for ResponderFn<F>
where
    F: Fn(&Parts, CacheResult) -> Response<Bytes> + Send + Sync,
{
    fn persist_status(&self) -> bool {
        true
    }

    fn persist_headers(&self) -> bool {
        true
    }

    fn respond(&self, request: &Parts, result: CacheResult) -> Response<Bytes> {
        (self.f)(request, result)
    }
}

impl<F> std::fmt::Debug for ResponderFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderFn").finish_non_exhaustive()
    }
}
