//! Error responses.

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderValue, Response, StatusCode, header};
use serde::Serialize;
use std::error::Error;
use tracing::warn;

/// Turns a failure into the response the client receives.
///
/// Handlers are the last step of a request and cannot fail themselves.
/// Any closure `Fn(&Parts, &(dyn Error + 'static)) -> Response<Bytes>` is a handler;
/// [`error_handler_fn`] helps type inference for unannotated closures.
pub trait ErrorHandler: Send + Sync {
    /// Builds the error response.
    fn handle(&self, request: &Parts, error: &(dyn Error + 'static)) -> Response<Bytes>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Parts, &(dyn Error + 'static)) -> Response<Bytes> + Send + Sync,
{
    fn handle(&self, request: &Parts, error: &(dyn Error + 'static)) -> Response<Bytes> {
        self(request, error)
    }
}

/// An [`ErrorHandler`] from a single function.
#[derive(Clone)]
pub struct ErrorHandlerFn<F> {
    f: F,
}

/// Wraps `f` into an [`ErrorHandler`].
pub fn error_handler_fn<F>(f: F) -> ErrorHandlerFn<F>
where
    F: Fn(&Parts, &(dyn Error + 'static)) -> Response<Bytes> + Send + Sync,
{
    ErrorHandlerFn { f }
}

impl<F> ErrorHandler for ErrorHandlerFn<F>
where
    F: Fn(&Parts, &(dyn Error + 'static)) -> Response<Bytes> + Send + Sync,
{
    fn handle(&self, request: &Parts, error: &(dyn Error + 'static)) -> Response<Bytes> {
        (self.f)(request, error)
    }
}

impl<F> std::fmt::Debug for ErrorHandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlerFn").finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

/// Responds with `{"message": "<error>"}` and a fixed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonErrorHandler {
    status: StatusCode,
}

impl JsonErrorHandler {
    /// Responds with `status`.
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    /// `400 Bad Request`, for key extraction failures.
    pub fn client() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    /// `500 Internal Server Error`, for backend failures.
    pub fn server() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The status sent.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl ErrorHandler for JsonErrorHandler {
    fn handle(&self, _request: &Parts, error: &(dyn Error + 'static)) -> Response<Bytes> {
        let message = error.to_string();
        let body = match serde_json::to_vec(&ErrorBody { message: &message }) {
            Ok(body) => Bytes::from(body),
            Err(err) => {
                warn!(error = %err, "failed to encode error body");
                Bytes::new()
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
