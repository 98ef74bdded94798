//! Moka backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use encore_backend::format::{Format, JsonFormat};
use encore_backend::{Backend, BackendResult, CacheBackend, DeleteStatus};
use encore_core::{BackendLabel, CacheKey, CacheValue, Raw};
use moka::future::Cache;
use tracing::trace;

use crate::builder::{MokaBackendBuilder, NoCapacity};

/// In-memory backend powered by Moka.
///
/// Cloning is cheap and clones share storage, so one backend can serve several
/// middleware instances; their keys are namespaced and never collide.
///
/// ```
/// use encore_moka::MokaBackend;
/// use encore_backend::BincodeFormat;
///
/// let backend = MokaBackend::builder()
///     .max_entries(1_000)
///     .value_format(BincodeFormat)
///     .build();
/// ```
///
/// Expiry is best-effort on Moka's side. Reads through
/// [`CacheBackend::get`] additionally treat entries past their expiry as missing.
#[derive(Clone)]
pub struct MokaBackend<S = JsonFormat>
where
    S: Format,
{
    pub(crate) cache: Cache<CacheKey, CacheValue<Raw>>,
    pub(crate) serializer: S,
    pub(crate) label: BackendLabel,
    pub(crate) default_ttl: Option<Duration>,
}

impl<S: Format> std::fmt::Debug for MokaBackend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaBackend")
            .field("label", &self.label)
            .field("entries", &self.cache.entry_count())
            .field("serializer", &self.serializer)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MokaBackend<JsonFormat> {
    /// Starts configuring a backend. Capacity must be chosen before `build()`.
    pub fn builder() -> MokaBackendBuilder<NoCapacity, JsonFormat> {
        MokaBackendBuilder::new()
    }
}

impl<S: Format> MokaBackend<S> {
    /// The underlying Moka cache.
    pub fn cache(&self) -> &Cache<CacheKey, CacheValue<Raw>> {
        &self.cache
    }
}

#[async_trait]
impl<S> Backend for MokaBackend<S>
where
    S: Format + Send + Sync,
{
    async fn read(&self, key: &CacheKey) -> BackendResult<Option<CacheValue<Raw>>> {
        Ok(self.cache.get(key).await)
    }

    async fn write(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        _ttl: Option<Duration>,
    ) -> BackendResult<()> {
        trace!(backend = %self.label, %key, expire = ?value.expire(), "moka insert");
        self.cache.insert(key.clone(), value).await;
        crate::metrics::record_occupancy(
            self.label.as_str(),
            self.cache.entry_count(),
            self.cache.weighted_size(),
        );
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        match self.cache.remove(key).await {
            Some(_) => Ok(DeleteStatus::Deleted(1)),
            None => Ok(DeleteStatus::Missing),
        }
    }

    fn label(&self) -> BackendLabel {
        self.label.clone()
    }

    fn value_format(&self) -> &dyn Format {
        &self.serializer
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }
}

impl<S> CacheBackend for MokaBackend<S> where S: Format + Send + Sync {}
