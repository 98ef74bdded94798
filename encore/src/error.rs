use std::sync::Arc;

use encore_backend::BackendError;
use thiserror::Error;

/// Failure of [`Actor::execute`](crate::Actor::execute).
///
/// Cloneable: one failure is delivered to every caller coalesced on the same key.
#[derive(Debug, Clone, Error)]
pub enum ActorError {
    /// Storage or codec failure.
    #[error("backend error: {0}")]
    Backend(Arc<BackendError>),
    /// The action itself failed. Nothing was stored.
    #[error("action failed: {0}")]
    Action(Arc<dyn std::error::Error + Send + Sync>),
    /// Gave up waiting for another caller's execution.
    #[error("timed out waiting for in-flight execution")]
    Timeout,
}

impl ActorError {
    /// Wraps any error returned by an action.
    pub fn action(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ActorError::Action(Arc::from(error.into()))
    }
}

impl From<BackendError> for ActorError {
    fn from(error: BackendError) -> Self {
        ActorError::Backend(Arc::new(error))
    }
}
