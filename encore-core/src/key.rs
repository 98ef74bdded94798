//! Idempotency and cache key types.
//!
//! - [`IdempotencyKey`] - what the client sent; the empty key is a sentinel meaning
//!   "do not deduplicate this request", never an error
//! - [`CacheKey`] - an idempotency key placed into a namespace, so that several
//!   middleware instances can share one backend without colliding
//!
//! ```
//! use encore_core::{CacheKey, IdempotencyKey};
//!
//! let key = IdempotencyKey::from("abc123");
//! let cache_key = key.namespaced("idempotency-payments");
//! assert_eq!(cache_key.to_string(), "idempotency-payments:abc123");
//! ```

use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

/// Client supplied identifier scoping which requests share one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(SmolStr);

impl IdempotencyKey {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<SmolStr>) -> Self {
        Self(key.into())
    }

    /// The sentinel key: requests resolving to it bypass deduplication.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` for the bypass sentinel.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Places this key into `namespace`.
    pub fn namespaced(&self, namespace: impl Into<SmolStr>) -> CacheKey {
        CacheKey::new(namespace, self.0.clone())
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

impl From<String> for IdempotencyKey {
    fn from(value: String) -> Self {
        Self(SmolStr::from(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    namespace: SmolStr,
    key: SmolStr,
}

/// A namespaced key identifying one entry in a backend.
///
/// `CacheKey` wraps its data in [`Arc`], so cloning only bumps a reference count.
/// Keys are cloned into the in-flight registry and into backends on every request.
#[derive(Clone, Debug)]
pub struct CacheKey {
    inner: Arc<CacheKeyInner>,
}

impl CacheKey {
    /// Creates a key inside `namespace`.
    pub fn new(namespace: impl Into<SmolStr>, key: impl Into<SmolStr>) -> Self {
        CacheKey {
            inner: Arc::new(CacheKeyInner {
                namespace: namespace.into(),
                key: key.into(),
            }),
        }
    }

    /// Returns the namespace part.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Returns the caller supplied part.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Returns the estimated memory usage of this key in bytes.
    ///
    /// `SmolStr` keeps strings of up to 23 bytes inline, only longer ones
    /// allocate and are counted separately.
    pub fn memory_size(&self) -> usize {
        use std::mem::size_of;

        let heap_size = |len: usize| len.saturating_sub(23);
        let arc_overhead = 2 * size_of::<usize>() + size_of::<CacheKeyInner>();

        size_of::<Self>()
            + arc_overhead
            + heap_size(self.inner.namespace.len())
            + heap_size(self.inner.key.len())
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for CacheKey {}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.namespace.is_empty() {
            write!(f, "{}", self.inner.key)
        } else {
            write!(f, "{}:{}", self.inner.namespace, self.inner.key)
        }
    }
}
