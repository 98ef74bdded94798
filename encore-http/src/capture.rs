//! Buffering response sink.
//!
//! [`ResponseCapture`] accepts everything a real response sink does (status,
//! header mutations, body writes) and keeps it in memory. Nothing reaches the
//! client until the capture has been turned into a [`CapturedResponse`] and
//! replayed from there.

use bytes::{Buf, Bytes, BytesMut};
use encore_core::{CapturedResponse, PersistenceFlags};
use http::{HeaderMap, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use thiserror::Error;

use crate::body::BoxError;

/// The handler's body could not be buffered.
#[derive(Debug, Error)]
#[error("failed to buffer response body: {0}")]
pub struct CaptureError(#[source] pub BoxError);

/// An in-memory response sink.
///
/// Status and headers commit on the first body write, the same way they do on
/// the wire: later [`set_status`](Self::set_status) calls are ignored, and a body
/// written without any status gets `200 OK`.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    committed: bool,
}

impl ResponseCapture {
    /// An empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a complete response, draining its body.
    pub async fn capture<B>(response: Response<B>) -> Result<Self, CaptureError>
    where
        B: HttpBody,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = response.into_parts();
        let mut body = std::pin::pin!(body);
        let mut capture = Self::new();
        capture.set_status(parts.status);
        *capture.headers_mut() = parts.headers;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| CaptureError(e.into()))?;
            if let Ok(mut data) = frame.into_data() {
                let chunk = data.copy_to_bytes(data.remaining());
                capture.write(&chunk);
            }
        }
        Ok(capture)
    }

    /// Sets the status. Ignored once the body has been written to.
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = Some(status);
        }
    }

    /// Effective status: the last one set before the first write, else `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Buffered headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the buffered headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Appends `chunk` to the body.
    pub fn write(&mut self, chunk: &[u8]) {
        if !self.committed {
            self.committed = true;
            self.status.get_or_insert(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }

    /// Body written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Splits the capture into persisted and ephemeral fields.
    pub fn into_captured(self, flags: PersistenceFlags) -> CapturedResponse {
        let status = self.status();
        CapturedResponse::build(status, self.headers, Bytes::from(self.body), flags)
    }
}
