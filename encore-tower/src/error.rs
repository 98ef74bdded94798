use encore::ActorError;
use encore_http::KeyError;
use thiserror::Error;

/// Why an idempotent request could not be served normally.
///
/// Handed to the client error handler for [`Key`](Self::Key) and to the
/// server error handler for everything else.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The request's idempotency key was rejected.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Storage, coalescing or the wrapped service failed.
    #[error(transparent)]
    Actor(#[from] ActorError),
}

impl IdempotencyError {
    /// Whether the client is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IdempotencyError::Key(_))
    }
}

/// Configuration values that cannot be turned into a middleware.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Not a valid HTTP header name.
    #[error("invalid header name `{value}` in `{field}`")]
    InvalidHeaderName {
        /// The offending configuration field.
        field: &'static str,
        /// The offending value.
        value: String,
    },
    /// Not a valid HTTP status code.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),
}
