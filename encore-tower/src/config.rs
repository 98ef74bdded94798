//! Serde-friendly configuration for [`Idempotency`].
//!
//! Durations are written in humantime notation (`30s`, `24h`).
//!
//! ```yaml
//! name: payments
//! ttl: 24h
//! wait_timeout: 30s
//! max_key_length: 255
//! replay:
//!   override_status: 200
//!   allowed_headers: ["content-type"]
//!   replay_header: idempotent-replayed
//! ```

use std::time::Duration;

use encore_backend::CacheBackend;
use encore_http::{CachedResponder, DEFAULT_KEY_HEADER, HeaderKeyExtractor, HeaderReplay};
use http::{HeaderName, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layer::Idempotency;

/// Allowed-headers entry standing for every header.
pub const ALL_HEADERS: &str = "*";

/// Middleware configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdempotencyConfig {
    /// Namespace of the stored responses. Middlewares sharing a backend and a
    /// name share their keys.
    pub name: String,
    /// Validity window of a stored response. Unset means the backend's default.
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Upper bound on waiting for a concurrent request with the same key.
    #[serde(default, with = "humantime_serde")]
    pub wait_timeout: Option<Duration>,
    /// Header carrying the idempotency key.
    #[serde(default = "default_key_header")]
    pub key_header: String,
    /// Longest accepted key, in bytes.
    #[serde(default)]
    pub max_key_length: Option<usize>,
    /// How responses are replayed.
    #[serde(default)]
    pub replay: ReplayConfig,
}

fn default_key_header() -> String {
    DEFAULT_KEY_HEADER.as_str().to_owned()
}

impl IdempotencyConfig {
    /// A configuration with every optional field at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl: None,
            wait_timeout: None,
            key_header: default_key_header(),
            max_key_length: None,
            replay: ReplayConfig::default(),
        }
    }

    /// The key extractor described by this configuration.
    pub fn key_extractor(&self) -> Result<HeaderKeyExtractor, ConfigError> {
        let header = parse_header("key_header", &self.key_header)?;
        let extractor = HeaderKeyExtractor::new(header);
        Ok(match self.max_key_length {
            Some(max) => extractor.max_length(max),
            None => extractor,
        })
    }

    /// Builds the middleware on top of `backend`.
    pub fn build<B>(&self, backend: B) -> Result<Idempotency<B>, ConfigError>
    where
        B: CacheBackend + 'static,
    {
        Idempotency::from_config(self, backend)
    }
}

/// Replay behaviour of [`CachedResponder`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    /// Status sent on every response instead of the handler's. `0` disables it.
    #[serde(default)]
    pub override_status: Option<u16>,
    /// Headers sent on replays. Unset or containing `"*"` means all of them.
    #[serde(default)]
    pub allowed_headers: Option<Vec<String>>,
    /// Header set to `true` on replays.
    #[serde(default)]
    pub replay_header: Option<String>,
}

impl ReplayConfig {
    /// The responder described by this configuration.
    pub fn responder(&self) -> Result<CachedResponder, ConfigError> {
        let mut responder = CachedResponder::new();

        // Zero means no override.
        if let Some(code) = self.override_status.filter(|&code| code != 0) {
            let status =
                StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatus(code))?;
            responder = responder.override_status(status);
        }

        match &self.allowed_headers {
            Some(names) if !names.iter().any(|name| name == ALL_HEADERS) => {
                let names = names
                    .iter()
                    .map(|name| parse_header("allowed_headers", name))
                    .collect::<Result<Vec<_>, _>>()?;
                responder = responder.headers(HeaderReplay::Only(names));
            }
            _ => {}
        }

        if let Some(name) = &self.replay_header {
            responder = responder.replay_header(parse_header("replay_header", name)?);
        }

        Ok(responder)
    }
}

fn parse_header(field: &'static str, value: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|_| ConfigError::InvalidHeaderName {
        field,
        value: value.to_owned(),
    })
}
