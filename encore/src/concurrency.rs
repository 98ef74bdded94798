//! In-process coalescing of concurrent executions.
//!
//! The first caller for a key proceeds and every later caller awaits its result
//! instead of running the same work again. A caller that proceeds owns an
//! [`InFlight`] guard; dropping it without completing (for example because the
//! request was cancelled) wakes the waiters with nothing, and they start over.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use encore_core::CacheKey;
use tokio::sync::broadcast;

/// Whether to run the work or await someone else's run.
pub enum ConcurrencyDecision<Res> {
    /// Nobody else is running it: go ahead.
    Proceed,
    /// Await the result of the in-flight execution.
    ///
    /// Resolves to `None` when that execution was abandoned.
    Await(Pin<Box<dyn Future<Output = Option<Res>> + Send>>),
}

/// Coalesces concurrent executions per key.
pub trait ConcurrencyManager<Res>: Send + Sync {
    /// Decides whether the caller for `cache_key` proceeds or waits.
    fn check(&self, cache_key: &CacheKey) -> ConcurrencyDecision<Res>;

    /// Hands `response` to every waiter and releases the key.
    fn complete(&self, cache_key: &CacheKey, response: Res) -> Res;

    /// Releases the key without a result.
    fn abandon(&self, cache_key: &CacheKey);
}

/// [`ConcurrencyManager`] built on one broadcast channel per in-flight key.
pub struct BroadcastConcurrencyManager<Res> {
    in_flight: Arc<DashMap<CacheKey, broadcast::Sender<Res>>>,
}

impl<Res> BroadcastConcurrencyManager<Res> {
    /// Creates a manager with nothing in flight.
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<Res> Default for BroadcastConcurrencyManager<Res> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Res> Clone for BroadcastConcurrencyManager<Res> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<Res> ConcurrencyManager<Res> for BroadcastConcurrencyManager<Res>
where
    Res: Clone + Send + 'static,
{
    fn check(&self, cache_key: &CacheKey) -> ConcurrencyDecision<Res> {
        match self.in_flight.entry(cache_key.clone()) {
            Entry::Occupied(entry) => {
                let mut receiver = entry.get().subscribe();
                ConcurrencyDecision::Await(Box::pin(async move { receiver.recv().await.ok() }))
            }
            Entry::Vacant(entry) => {
                let (sender, _) = broadcast::channel(1);
                entry.insert(sender);
                ConcurrencyDecision::Proceed
            }
        }
    }

    fn complete(&self, cache_key: &CacheKey, response: Res) -> Res {
        if let Some((_, sender)) = self.in_flight.remove(cache_key) {
            // No receivers is fine: nobody was waiting.
            let _ = sender.send(response.clone());
        }
        response
    }

    fn abandon(&self, cache_key: &CacheKey) {
        // Dropping the sender closes every subscribed receiver.
        self.in_flight.remove(cache_key);
    }
}

/// Ownership of an in-flight key. Abandons the key on drop unless completed.
pub struct InFlight<'a, Res> {
    manager: &'a dyn ConcurrencyManager<Res>,
    key: CacheKey,
    done: bool,
}

impl<'a, Res> InFlight<'a, Res> {
    /// Takes ownership of `key`, which must have been granted by `manager`.
    pub fn new(manager: &'a dyn ConcurrencyManager<Res>, key: CacheKey) -> Self {
        Self {
            manager,
            key,
            done: false,
        }
    }

    /// Delivers `response` to the waiters and releases the key.
    pub fn complete(mut self, response: Res) -> Res {
        self.done = true;
        self.manager.complete(&self.key, response)
    }
}

impl<Res> Drop for InFlight<'_, Res> {
    fn drop(&mut self) {
        if !self.done {
            self.manager.abandon(&self.key);
        }
    }
}
