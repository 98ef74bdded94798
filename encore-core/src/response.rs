//! Captured response model.
//!
//! A [`CapturedResponse`] is the structural record of a finished handler response.
//! Each of its three fields (status, headers, body) lives in exactly one of two
//! slots, chosen by [`PersistenceFlags`] when the response is built:
//!
//! - the **persisted** slot, which is what gets serialized into a backend and is
//!   therefore visible to every later caller, in any process;
//! - the **ephemeral** slot, which never leaves the invocation that produced it.
//!
//! Readers go through [`CapturedResponse::status_code`], [`CapturedResponse::headers`]
//! and [`CapturedResponse::body`], which return the persisted value when present
//! (non-zero status, non-empty collection) and fall back to the ephemeral one.
//!
//! ```
//! use bytes::Bytes;
//! use encore_core::{CapturedResponse, PersistenceFlags};
//! use http::{HeaderMap, StatusCode};
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-debug", "large".parse().unwrap());
//!
//! let flags = PersistenceFlags::new(true, false, true);
//! let response = CapturedResponse::build(StatusCode::CREATED, headers, Bytes::from("{}"), flags);
//!
//! // The producing call still sees everything.
//! assert_eq!(response.headers().len(), 1);
//!
//! // Anyone else only sees what was persisted.
//! let shared = response.persisted_only();
//! assert!(shared.headers().is_empty());
//! assert_eq!(shared.status_code(), 201);
//! ```

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Cacheable;

/// Per-field switches deciding what survives into the durable representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceFlags {
    /// Persist the status code.
    pub status: bool,
    /// Persist the header map.
    pub headers: bool,
    /// Persist the body.
    pub body: bool,
}

impl PersistenceFlags {
    /// Every field persisted.
    pub const ALL: PersistenceFlags = PersistenceFlags {
        status: true,
        headers: true,
        body: true,
    };

    /// Creates a new set of flags.
    pub const fn new(status: bool, headers: bool, body: bool) -> Self {
        PersistenceFlags {
            status,
            headers,
            body,
        }
    }
}

impl Default for PersistenceFlags {
    fn default() -> Self {
        Self::ALL
    }
}

/// One slot of a captured response.
///
/// A zero status and empty collections mean "not present in this slot".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFields {
    /// Numeric status code, `0` when absent.
    #[serde(default)]
    pub status: u16,
    /// Multi-valued header map.
    #[serde(default, with = "header_list")]
    pub headers: HeaderMap,
    /// Response body bytes.
    #[serde(default)]
    pub body: Bytes,
}

/// The canonical response for one idempotency key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedResponse {
    persisted: ResponseFields,
    ephemeral: ResponseFields,
}

impl CapturedResponse {
    /// Routes `status`, `headers` and `body` into the persisted or the ephemeral
    /// slot according to `flags`.
    pub fn build(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        flags: PersistenceFlags,
    ) -> Self {
        let mut persisted = ResponseFields::default();
        let mut ephemeral = ResponseFields::default();

        let status = status.as_u16();
        if flags.status {
            persisted.status = status;
        } else {
            ephemeral.status = status;
        }

        if flags.headers {
            persisted.headers = headers;
        } else {
            ephemeral.headers = headers;
        }

        if flags.body {
            persisted.body = body;
        } else {
            ephemeral.body = body;
        }

        CapturedResponse {
            persisted,
            ephemeral,
        }
    }

    /// Rebuilds a response from its durable representation.
    pub fn from_persisted(persisted: ResponseFields) -> Self {
        CapturedResponse {
            persisted,
            ephemeral: ResponseFields::default(),
        }
    }

    /// Status code, `0` when neither slot carries one.
    pub fn status_code(&self) -> u16 {
        if self.persisted.status != 0 {
            self.persisted.status
        } else {
            self.ephemeral.status
        }
    }

    /// Status code as [`StatusCode`], `None` when unknown or out of range.
    pub fn status(&self) -> Option<StatusCode> {
        match self.status_code() {
            0 => None,
            code => StatusCode::from_u16(code).ok(),
        }
    }

    /// Header map, persisted first.
    pub fn headers(&self) -> &HeaderMap {
        if !self.persisted.headers.is_empty() {
            &self.persisted.headers
        } else {
            &self.ephemeral.headers
        }
    }

    /// Body bytes, persisted first.
    pub fn body(&self) -> &Bytes {
        if !self.persisted.body.is_empty() {
            &self.persisted.body
        } else {
            &self.ephemeral.body
        }
    }

    /// The durable slot.
    pub fn persisted(&self) -> &ResponseFields {
        &self.persisted
    }

    /// The slot only the producing invocation can see.
    pub fn ephemeral(&self) -> &ResponseFields {
        &self.ephemeral
    }

    /// A copy without the ephemeral slot, as any other caller would observe it.
    pub fn persisted_only(&self) -> Self {
        Self::from_persisted(self.persisted.clone())
    }
}

impl Serialize for CapturedResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.persisted.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapturedResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        ResponseFields::deserialize(deserializer).map(Self::from_persisted)
    }
}

impl Cacheable for CapturedResponse {
    fn shared(&self) -> Self {
        self.persisted_only()
    }
}

/// A captured response plus where it came from. Produced once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult {
    /// `false` only for the call whose action actually executed.
    pub from_cache: bool,
    /// The response to reply with.
    pub response: CapturedResponse,
}

impl CacheResult {
    /// Creates a new result.
    pub fn new(from_cache: bool, response: CapturedResponse) -> Self {
        CacheResult {
            from_cache,
            response,
        }
    }
}

/// Headers as an ordered list of `(name, [values])`.
///
/// Values are kept as raw bytes, since HTTP allows opaque bytes above 0x7f.
/// Works with self-describing and positional formats alike. Entries that no
/// longer parse as a header name or value are skipped on the way back in.
mod header_list {
    use bytes::Bytes;
    use http::{HeaderMap, HeaderName, HeaderValue};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries: Vec<(&str, Vec<Bytes>)> = headers
            .keys()
            .map(|name| {
                let values = headers
                    .get_all(name)
                    .iter()
                    .map(|value| Bytes::copy_from_slice(value.as_bytes()))
                    .collect();
                (name.as_str(), values)
            })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HeaderMap, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<(String, Vec<Bytes>)>::deserialize(deserializer)?;
        let mut headers = HeaderMap::new();
        for (name, values) in entries {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_maybe_shared(value) {
                    headers.append(name.clone(), value);
                }
            }
        }
        Ok(headers)
    }
}
