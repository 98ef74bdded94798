#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod config;
mod error;
mod layer;
mod service;

pub use config::{IdempotencyConfig, ReplayConfig};
pub use error::{ConfigError, IdempotencyError};
pub use layer::{Idempotency, IdempotencyBuilder, NotSet};
pub use service::IdempotencyService;

pub use encore_http::{
    CacheResult, CachedResponder, CapturedResponse, ErrorHandler, HeaderKeyExtractor,
    HeaderReplay, IdempotencyKey, JsonErrorHandler, KeyError, KeyExtractor, PersistenceFlags,
    ReplayBody, Responder, error_handler_fn, responder_fn,
};
