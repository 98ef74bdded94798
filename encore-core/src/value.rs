//! Stored values with expiration metadata.
//!
//! A [`CacheValue`] is what a backend holds for one key: the data and the
//! moment it stops being authoritative. The validity window of an idempotency
//! key is exactly the span between the write and [`CacheValue::expire`].

use chrono::{DateTime, Utc};
use std::mem::size_of;
use std::time::Duration;

use crate::Raw;

/// A stored value with an optional expiry timestamp.
///
/// ```
/// use encore_core::CacheValue;
/// use std::time::Duration;
///
/// let value = CacheValue::with_ttl("payload", Some(Duration::from_secs(60)));
/// assert!(!value.is_expired());
/// assert_eq!(value.into_inner(), "payload");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValue<T> {
    data: T,
    expire: Option<DateTime<Utc>>,
}

impl<T> CacheValue<T> {
    /// Creates a value expiring at `expire` (never, if `None`).
    pub fn new(data: T, expire: Option<DateTime<Utc>>) -> Self {
        CacheValue { data, expire }
    }

    /// Creates a value expiring `ttl` from now.
    pub fn with_ttl(data: T, ttl: Option<Duration>) -> Self {
        let expire = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);
        CacheValue { data, expire }
    }

    /// Returns a reference to the stored data.
    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns when the value stops being valid.
    #[inline]
    pub fn expire(&self) -> Option<DateTime<Utc>> {
        self.expire
    }

    /// Consumes the value and returns the inner data.
    pub fn into_inner(self) -> T {
        self.data
    }

    /// Splits the value into its expiry and data.
    pub fn into_parts(self) -> (Option<DateTime<Utc>>, T) {
        (self.expire, self.data)
    }

    /// Returns `true` once the expiry timestamp has passed.
    pub fn is_expired(&self) -> bool {
        self.expire.is_some_and(|expire| expire <= Utc::now())
    }

    /// Remaining time to live, `None` when the value never expires or already expired.
    pub fn ttl(&self) -> Option<Duration> {
        self.expire.and_then(|expire| {
            let remaining = expire.signed_duration_since(Utc::now());
            remaining.to_std().ok().filter(|d| !d.is_zero())
        })
    }
}

impl CacheValue<Raw> {
    /// Returns the estimated memory usage of this value in bytes.
    pub fn memory_size(&self) -> usize {
        size_of::<Self>() + self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_without_expiry_never_expires() {
        let value = CacheValue::new(1u8, None);
        assert!(!value.is_expired());
        assert_eq!(value.ttl(), None);
    }

    #[test]
    fn test_value_in_the_past_is_expired() {
        let value = CacheValue::new(1u8, Some(Utc::now() - chrono::Duration::seconds(1)));
        assert!(value.is_expired());
        assert_eq!(value.ttl(), None);
    }

    #[test]
    fn test_with_ttl_sets_future_expiry() {
        let value = CacheValue::with_ttl((), Some(Duration::from_secs(30)));
        let ttl = value.ttl().expect("ttl should be set");
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(25));
    }

    #[test]
    fn test_memory_size_counts_payload() {
        let small = CacheValue::new(Raw::from_static(b"a"), None);
        let large = CacheValue::new(Raw::from(vec![0u8; 101]), None);
        assert_eq!(large.memory_size() - small.memory_size(), 100);
    }
}
