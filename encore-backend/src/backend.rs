use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use encore_core::{BackendLabel, CacheKey, CacheValue, Cacheable, Raw};
use tracing::trace;

use crate::{
    BackendError, DeleteStatus,
    format::{Format, FormatExt, JsonFormat},
};

/// Result alias used by every backend operation.
pub type BackendResult<T> = Result<T, BackendError>;

/// Raw byte storage with per-entry expiry.
///
/// Backends never interpret stored bytes. Serialization happens one level up in
/// [`CacheBackend`] using [`Backend::value_format`].
#[async_trait]
pub trait Backend: Sync + Send {
    /// Reads the entry stored under `key`.
    async fn read(&self, key: &CacheKey) -> BackendResult<Option<CacheValue<Raw>>>;

    /// Stores `value` under `key`.
    ///
    /// `ttl` mirrors `value.expire()` for backends that expire entries natively.
    async fn write(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Option<Duration>,
    ) -> BackendResult<()>;

    /// Removes the entry stored under `key`.
    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus>;

    /// Returns the label used in logs and metrics.
    fn label(&self) -> BackendLabel {
        BackendLabel::new_static("backend")
    }

    /// Codec for values stored in this backend.
    fn value_format(&self) -> &dyn Format {
        &JsonFormat
    }

    /// Validity window applied when the caller does not choose one.
    fn default_ttl(&self) -> Option<Duration> {
        None
    }
}

#[async_trait]
impl Backend for &dyn Backend {
    async fn read(&self, key: &CacheKey) -> BackendResult<Option<CacheValue<Raw>>> {
        (*self).read(key).await
    }

    async fn write(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Option<Duration>,
    ) -> BackendResult<()> {
        (*self).write(key, value, ttl).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        (*self).remove(key).await
    }

    fn label(&self) -> BackendLabel {
        (*self).label()
    }

    fn value_format(&self) -> &dyn Format {
        (*self).value_format()
    }

    fn default_ttl(&self) -> Option<Duration> {
        (*self).default_ttl()
    }
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    async fn read(&self, key: &CacheKey) -> BackendResult<Option<CacheValue<Raw>>> {
        (**self).read(key).await
    }

    async fn write(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Option<Duration>,
    ) -> BackendResult<()> {
        (**self).write(key, value, ttl).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        (**self).remove(key).await
    }

    fn label(&self) -> BackendLabel {
        (**self).label()
    }

    fn value_format(&self) -> &dyn Format {
        (**self).value_format()
    }

    fn default_ttl(&self) -> Option<Duration> {
        (**self).default_ttl()
    }
}

#[async_trait]
impl Backend for Arc<dyn Backend + Send + 'static> {
    async fn read(&self, key: &CacheKey) -> BackendResult<Option<CacheValue<Raw>>> {
        (**self).read(key).await
    }

    async fn write(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Option<Duration>,
    ) -> BackendResult<()> {
        (**self).write(key, value, ttl).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        (**self).remove(key).await
    }

    fn label(&self) -> BackendLabel {
        (**self).label()
    }

    fn value_format(&self) -> &dyn Format {
        (**self).value_format()
    }

    fn default_ttl(&self) -> Option<Duration> {
        (**self).default_ttl()
    }
}

/// Typed cache operations on top of [`Backend`].
///
/// Values go through [`Backend::value_format`] on the way in and out. Entries whose
/// expiry has passed are reported as missing even if the storage still holds them.
pub trait CacheBackend: Backend {
    /// Reads and decodes the entry stored under `key`.
    fn get<T>(
        &self,
        key: &CacheKey,
    ) -> impl Future<Output = BackendResult<Option<CacheValue<T>>>> + Send
    where
        T: Cacheable,
    {
        async move {
            match self.read(key).await? {
                Some(value) if value.is_expired() => {
                    trace!(backend = %self.label(), %key, "stored entry already expired");
                    Ok(None)
                }
                Some(value) => {
                    let (expire, raw) = value.into_parts();
                    let data = self.value_format().deserialize::<T>(&raw)?;
                    Ok(Some(CacheValue::new(data, expire)))
                }
                None => Ok(None),
            }
        }
    }

    /// Encodes `value` and stores it under `key`.
    fn set<T>(
        &self,
        key: &CacheKey,
        value: &CacheValue<T>,
    ) -> impl Future<Output = BackendResult<()>> + Send
    where
        T: Cacheable,
    {
        async move {
            let raw = self.value_format().serialize(value.data())?;
            trace!(backend = %self.label(), %key, bytes = raw.len(), "storing entry");
            self.write(key, CacheValue::new(raw, value.expire()), value.ttl())
                .await
        }
    }

    /// Removes the entry stored under `key`.
    fn delete(&self, key: &CacheKey) -> impl Future<Output = BackendResult<DeleteStatus>> + Send {
        async move { self.remove(key).await }
    }
}

impl CacheBackend for &dyn Backend {}

impl CacheBackend for Box<dyn Backend> {}

impl CacheBackend for Arc<dyn Backend + Send + 'static> {}
