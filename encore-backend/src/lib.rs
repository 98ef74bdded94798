#![warn(missing_docs)]
//! Traits and structs for encore backend interaction.
//!
//! If you want to store idempotent responses somewhere new, you are in the right place:
//! implement [`Backend`] for your storage and add an empty `impl CacheBackend`.
mod backend;
mod error;
pub mod format;

pub use backend::{Backend, BackendResult, CacheBackend};
pub use error::{BackendError, DeleteStatus};
pub use format::{BincodeFormat, Format, FormatError, FormatExt, FormatTypeId, JsonFormat};
