//! Builder for configuring [`MokaBackend`].

use std::time::{Duration, Instant};

use chrono::Utc;
use encore_backend::format::{Format, JsonFormat};
use encore_core::{BackendLabel, CacheKey, CacheValue, Raw};
use moka::Expiry;
use moka::future::{Cache, CacheBuilder};
use moka::policy::EvictionPolicy;

use crate::backend::MokaBackend;

/// Expires entries at their [`CacheValue::expire`] timestamp.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Expiration;

impl Expiry<CacheKey, CacheValue<Raw>> for Expiration {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheValue<Raw>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::remaining(value)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &CacheValue<Raw>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // A rewritten key starts a new validity window.
        Self::remaining(value)
    }
}

impl Expiration {
    fn remaining(value: &CacheValue<Raw>) -> Option<Duration> {
        value.expire().map(|expire| {
            (expire - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }
}

/// Marker: capacity not chosen yet, `build()` unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapacity;

/// Marker: capacity bounded by entry count.
#[derive(Debug, Clone, Copy)]
pub struct EntryCapacity(pub(crate) u64);

/// Marker: capacity bounded by an approximate byte budget.
#[derive(Debug, Clone, Copy)]
pub struct ByteCapacity(pub(crate) u64);

/// Builder for [`MokaBackend`], created with [`MokaBackend::builder`].
///
/// Exactly one of [`max_entries`](Self::max_entries) or [`max_bytes`](Self::max_bytes)
/// must be called; the capacity marker type makes `build()` available only then.
///
/// ```
/// use std::time::Duration;
/// use encore_moka::{EvictionPolicy, MokaBackend};
///
/// let backend = MokaBackend::builder()
///     .label("payments")
///     .max_bytes(64 * 1024 * 1024)
///     .eviction_policy(EvictionPolicy::lru())
///     .default_ttl(Duration::from_secs(3600))
///     .build();
/// ```
pub struct MokaBackendBuilder<Cap, S = JsonFormat>
where
    S: Format,
{
    capacity: Cap,
    serializer: S,
    label: BackendLabel,
    eviction_policy: Option<EvictionPolicy>,
    default_ttl: Option<Duration>,
}

impl MokaBackendBuilder<NoCapacity, JsonFormat> {
    /// Creates a builder with JSON values, label `"moka"` and no default TTL.
    pub fn new() -> Self {
        Self {
            capacity: NoCapacity,
            serializer: JsonFormat,
            label: BackendLabel::new_static("moka"),
            eviction_policy: None,
            default_ttl: None,
        }
    }
}

impl Default for MokaBackendBuilder<NoCapacity, JsonFormat> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MokaBackendBuilder<NoCapacity, S>
where
    S: Format,
{
    /// Holds at most `capacity` entries.
    pub fn max_entries(self, capacity: u64) -> MokaBackendBuilder<EntryCapacity, S> {
        self.with_capacity(EntryCapacity(capacity))
    }

    /// Holds roughly `bytes` bytes of keys and encoded responses.
    pub fn max_bytes(self, bytes: u64) -> MokaBackendBuilder<ByteCapacity, S> {
        self.with_capacity(ByteCapacity(bytes))
    }

    fn with_capacity<Cap>(self, capacity: Cap) -> MokaBackendBuilder<Cap, S> {
        MokaBackendBuilder {
            capacity,
            serializer: self.serializer,
            label: self.label,
            eviction_policy: self.eviction_policy,
            default_ttl: self.default_ttl,
        }
    }
}

impl<Cap, S> MokaBackendBuilder<Cap, S>
where
    S: Format,
{
    /// Label used in logs and metrics. Default `"moka"`.
    pub fn label(mut self, label: impl Into<BackendLabel>) -> Self {
        self.label = label.into();
        self
    }

    /// Eviction policy once capacity is reached.
    ///
    /// Defaults to [`EvictionPolicy::tiny_lfu`] for entry capacity and
    /// [`EvictionPolicy::lru`] for byte capacity, where TinyLFU admission could
    /// reject a fresh response even though evicting older ones would make room.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Validity window used when the middleware does not configure its own.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Codec for stored responses. Default [`JsonFormat`].
    pub fn value_format<NewS>(self, serializer: NewS) -> MokaBackendBuilder<Cap, NewS>
    where
        NewS: Format,
    {
        MokaBackendBuilder {
            capacity: self.capacity,
            serializer,
            label: self.label,
            eviction_policy: self.eviction_policy,
            default_ttl: self.default_ttl,
        }
    }

    fn finish(self, cache: Cache<CacheKey, CacheValue<Raw>>) -> MokaBackend<S> {
        MokaBackend {
            cache,
            serializer: self.serializer,
            label: self.label,
            default_ttl: self.default_ttl,
        }
    }
}

impl<S> MokaBackendBuilder<EntryCapacity, S>
where
    S: Format,
{
    /// Builds a backend bounded by entry count.
    pub fn build(self) -> MokaBackend<S> {
        let policy = self
            .eviction_policy
            .clone()
            .unwrap_or_else(EvictionPolicy::tiny_lfu);
        let cache = CacheBuilder::new(self.capacity.0)
            .eviction_policy(policy)
            .expire_after(Expiration)
            .build();
        self.finish(cache)
    }
}

impl<S> MokaBackendBuilder<ByteCapacity, S>
where
    S: Format,
{
    /// Builds a backend bounded by an approximate byte budget.
    pub fn build(self) -> MokaBackend<S> {
        let policy = self
            .eviction_policy
            .clone()
            .unwrap_or_else(EvictionPolicy::lru);
        let cache = CacheBuilder::new(self.capacity.0)
            .weigher(byte_weigher)
            .eviction_policy(policy)
            .expire_after(Expiration)
            .build();
        self.finish(cache)
    }
}

fn byte_weigher(key: &CacheKey, value: &CacheValue<Raw>) -> u32 {
    u32::try_from(key.memory_size() + value.memory_size()).unwrap_or(u32::MAX)
}
