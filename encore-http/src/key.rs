//! Idempotency key extraction.

use encore_core::IdempotencyKey;
use http::HeaderName;
use http::request::Parts;
use thiserror::Error;

/// Header read by [`HeaderKeyExtractor::default`].
pub const DEFAULT_KEY_HEADER: HeaderName = HeaderName::from_static("idempotency-key");

/// The request's idempotency key is unacceptable. Always a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Longer than the configured maximum.
    #[error("idempotency key is {len} bytes long, at most {max} allowed")]
    TooLong {
        /// Length of the received key.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The header value is not valid UTF-8.
    #[error("idempotency key is not valid UTF-8")]
    NotUtf8,
    /// Rejected by a custom extractor.
    #[error("{0}")]
    Invalid(String),
}

impl KeyError {
    /// A custom rejection with a human-readable message.
    pub fn invalid(message: impl Into<String>) -> Self {
        KeyError::Invalid(message.into())
    }
}

/// Derives the idempotency key from a request.
///
/// Returning [`IdempotencyKey::empty`] means the request is not deduplicated.
/// Any closure `Fn(&Parts) -> Result<IdempotencyKey, KeyError>` is an extractor.
pub trait KeyExtractor: Send + Sync {
    /// Extracts the key.
    fn extract(&self, request: &Parts) -> Result<IdempotencyKey, KeyError>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Parts) -> Result<IdempotencyKey, KeyError> + Send + Sync,
{
    fn extract(&self, request: &Parts) -> Result<IdempotencyKey, KeyError> {
        self(request)
    }
}

/// Reads the key verbatim from a request header.
///
/// A missing header yields the empty key. Values that are not UTF-8 are
/// rejected rather than mapped, so distinct byte strings never share a key.
#[derive(Debug, Clone)]
pub struct HeaderKeyExtractor {
    header: HeaderName,
    max_length: Option<usize>,
}

impl HeaderKeyExtractor {
    /// Reads `header`.
    pub fn new(header: HeaderName) -> Self {
        Self {
            header,
            max_length: None,
        }
    }

    /// Rejects keys longer than `max` bytes.
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// The header read.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for HeaderKeyExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_HEADER)
    }
}

impl KeyExtractor for HeaderKeyExtractor {
    fn extract(&self, request: &Parts) -> Result<IdempotencyKey, KeyError> {
        let Some(value) = request.headers.get(&self.header) else {
            return Ok(IdempotencyKey::empty());
        };
        let key = std::str::from_utf8(value.as_bytes()).map_err(|_| KeyError::NotUtf8)?;
        if let Some(max) = self.max_length
            && key.len() > max
        {
            return Err(KeyError::TooLong {
                len: key.len(),
                max,
            });
        }
        Ok(IdempotencyKey::from(key))
    }
}
