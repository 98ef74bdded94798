//! The single-flight cache actor.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use encore_backend::{CacheBackend, DeleteStatus};
use encore_core::{CacheKey, CacheValue, Cacheable, IdempotencyKey};
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::concurrency::{
    BroadcastConcurrencyManager, ConcurrencyDecision, ConcurrencyManager, InFlight,
};
use crate::{ActorError, metrics};

/// What an action produced and whether it should be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult<T> {
    /// The produced value.
    pub value: T,
    /// Store `value` for the validity window.
    pub cache: bool,
}

impl<T> ActionResult<T> {
    /// A value to store.
    pub fn cache(value: T) -> Self {
        Self { value, cache: true }
    }

    /// A value handed to the current callers only.
    pub fn skip(value: T) -> Self {
        Self {
            value,
            cache: false,
        }
    }
}

/// Runs at most one action per key and validity window.
///
/// Within one process concurrent callers are coalesced onto the first caller's
/// execution. Across processes sharing a backend, every caller checks storage
/// first, so an entry written by one process answers the others.
pub struct Actor<T, B> {
    name: SmolStr,
    backend: B,
    ttl: Option<Duration>,
    wait_timeout: Option<Duration>,
    concurrency: BroadcastConcurrencyManager<Result<T, ActorError>>,
}

impl<T, B> fmt::Debug for Actor<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("wait_timeout", &self.wait_timeout)
            .field("in_flight", &self.concurrency.in_flight())
            .finish_non_exhaustive()
    }
}

impl<T, B> Actor<T, B>
where
    T: Cacheable,
    B: CacheBackend,
{
    /// Creates an actor storing into `backend` under the namespace `name`.
    pub fn new(name: impl Into<SmolStr>, backend: B) -> Self {
        Self {
            name: name.into(),
            backend,
            ttl: None,
            wait_timeout: None,
            concurrency: BroadcastConcurrencyManager::new(),
        }
    }

    /// Validity window of stored values. Unset means the backend's default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Upper bound on waiting for another caller's execution.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// The namespace keys are placed into.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// TTL applied to stored values, falling back to the backend's default.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.or_else(|| self.backend.default_ttl())
    }

    /// Places `key` into this actor's namespace.
    pub fn key(&self, key: &IdempotencyKey) -> CacheKey {
        key.namespaced(self.name.clone())
    }

    /// Returns the value for `key`, running `action` if there is none yet.
    ///
    /// The caller whose `action` ran receives its full value. Every other caller
    /// receives [`Cacheable::shared`]. An error from `action` is delivered to the
    /// callers coalesced on that execution and nothing is stored.
    pub async fn execute<F, Fut, E>(&self, key: &CacheKey, action: F) -> Result<T, ActorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ActionResult<T>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            if let Some(value) = self.lookup(key).await? {
                return Ok(value);
            }

            match self.concurrency.check(key) {
                ConcurrencyDecision::Proceed => {
                    let in_flight = InFlight::new(&self.concurrency, key.clone());
                    return self.lead(key, in_flight, action).await;
                }
                ConcurrencyDecision::Await(waiter) => {
                    debug!(actor = %self.name, %key, "awaiting in-flight execution");
                    metrics::record_coalesced(&self.name);
                    let outcome = match self.wait_timeout {
                        Some(timeout) => tokio::time::timeout(timeout, waiter)
                            .await
                            .map_err(|_| ActorError::Timeout)?,
                        None => waiter.await,
                    };
                    match outcome {
                        Some(result) => return result,
                        None => {
                            debug!(actor = %self.name, %key, "in-flight execution abandoned, retrying");
                        }
                    }
                }
            }
        }
    }

    /// Removes the stored value for `key`, opening a new validity window.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<DeleteStatus, ActorError> {
        let status = self.backend.delete(key).await?;
        debug!(actor = %self.name, %key, ?status, "invalidated");
        Ok(status)
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<T>, ActorError> {
        match self.backend.get::<T>(key).await {
            Ok(Some(value)) => {
                debug!(actor = %self.name, %key, "answered from storage");
                metrics::record_hit(&self.name);
                Ok(Some(value.into_inner()))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(actor = %self.name, %key, error = %err, "backend read failed");
                Err(err.into())
            }
        }
    }

    async fn lead<F, Fut, E>(
        &self,
        key: &CacheKey,
        in_flight: InFlight<'_, Result<T, ActorError>>,
        action: F,
    ) -> Result<T, ActorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ActionResult<T>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        // A leader in this process may have finished between our read and the check.
        match self.lookup(key).await {
            Ok(Some(value)) => return in_flight.complete(Ok(value)),
            Ok(None) => {}
            Err(err) => return in_flight.complete(Err(err)),
        }

        let started = Instant::now();
        let outcome = action().await;
        let elapsed = started.elapsed();

        let ActionResult { value, cache } = match outcome {
            Ok(result) => result,
            Err(err) => {
                let err = ActorError::action(err);
                metrics::record_action(&self.name, elapsed, false);
                warn!(actor = %self.name, %key, error = %err, "action failed");
                return in_flight.complete(Err(err));
            }
        };
        metrics::record_action(&self.name, elapsed, true);
        debug!(actor = %self.name, %key, ?elapsed, cache, "action executed");

        let shared = if cache {
            let stored = CacheValue::with_ttl(value.shared(), self.ttl());
            if let Err(err) = self.backend.set(key, &stored).await {
                warn!(actor = %self.name, %key, error = %err, "backend write failed");
                return in_flight.complete(Err(err.into()));
            }
            stored.into_inner()
        } else {
            value.shared()
        };

        let _ = in_flight.complete(Ok(shared));
        Ok(value)
    }
}
