//! Body of every response leaving the middleware.
//!
//! Requests without an idempotency key are answered by the inner service untouched,
//! so their body streams through as [`ReplayBody::Passthrough`]. Everything else
//! (replays, fresh captures, error responses) is fully buffered and sent as
//! [`ReplayBody::Complete`].

use bytes::{Buf, Bytes};
use http::Response;
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed error produced by a passthrough body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Either the inner service's body or a buffered one.
#[pin_project(project = ReplayBodyProj)]
#[derive(Debug)]
pub enum ReplayBody<B> {
    /// The inner service's body, forwarded as-is.
    Passthrough(#[pin] B),
    /// Buffered bytes, yielded once.
    Complete(Option<Bytes>),
}

impl<B> ReplayBody<B> {
    /// A buffered body.
    pub fn full(bytes: Bytes) -> Self {
        ReplayBody::Complete(Some(bytes))
    }

    /// Converts a buffered response into one carrying a `ReplayBody`.
    pub fn from_response(response: Response<Bytes>) -> Response<Self> {
        response.map(Self::full)
    }
}

impl<B> HttpBody for ReplayBody<B>
where
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            ReplayBodyProj::Complete(data) => match data.take() {
                Some(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                _ => Poll::Ready(None),
            },
            ReplayBodyProj::Passthrough(body) => match body.poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e.into()))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            ReplayBody::Complete(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            ReplayBody::Complete(None) => SizeHint::with_exact(0),
            ReplayBody::Passthrough(body) => body.size_hint(),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            ReplayBody::Complete(Some(bytes)) => bytes.is_empty(),
            ReplayBody::Complete(None) => true,
            ReplayBody::Passthrough(body) => body.is_end_stream(),
        }
    }
}
