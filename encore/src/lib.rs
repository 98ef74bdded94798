#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod actor;
/// In-process coalescing of concurrent executions per key.
pub mod concurrency;
mod error;
/// Metrics for actor observability, populated with the `metrics` feature.
pub mod metrics;

pub use actor::{ActionResult, Actor};
pub use error::ActorError;

pub use encore_backend::{Backend, BackendError, CacheBackend};
pub use encore_core::{CacheKey, CacheValue, Cacheable, IdempotencyKey};
