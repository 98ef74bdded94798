#![warn(missing_docs)]
//! # encore-core
//!
//! Core types for the encore idempotency middleware.
//!
//! This crate holds the vocabulary every other crate speaks:
//!
//! - [`IdempotencyKey`] - the client supplied key, empty meaning "no deduplication"
//! - [`CacheKey`] - the key namespaced by middleware instance, as seen by backends
//! - [`CacheValue`] - a stored value with its expiry timestamp
//! - [`CapturedResponse`] - a finished response split into persisted and ephemeral fields
//! - [`PersistenceFlags`] - which response fields survive into the durable representation
//! - [`CacheResult`] - a captured response plus whether it came from cache

pub mod cacheable;
pub mod key;
pub mod label;
pub mod response;
pub mod value;

pub use cacheable::Cacheable;
pub use key::{CacheKey, IdempotencyKey};
pub use label::BackendLabel;
pub use response::{CacheResult, CapturedResponse, PersistenceFlags, ResponseFields};
pub use value::CacheValue;

/// Raw byte data type used for serialized cache values.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;
