#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod body;
pub mod capture;
pub mod error;
pub mod key;
pub mod responder;

pub use body::ReplayBody;
pub use capture::{CaptureError, ResponseCapture};
pub use error::{ErrorHandler, ErrorHandlerFn, JsonErrorHandler, error_handler_fn};
pub use key::{DEFAULT_KEY_HEADER, HeaderKeyExtractor, KeyError, KeyExtractor};
pub use responder::{CachedResponder, HeaderReplay, Responder, ResponderFn, responder_fn};

pub use encore_core::{CacheResult, CapturedResponse, IdempotencyKey, PersistenceFlags};
