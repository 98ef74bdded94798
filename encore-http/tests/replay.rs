//! Capture a handler response, store it, and replay it the way another process would.

use bytes::Bytes;
use encore_backend::{BincodeFormat, Format, FormatExt, JsonFormat};
use encore_http::{
    CacheResult, CachedResponder, CapturedResponse, HeaderReplay, Responder, ResponseCapture,
};
use http::request::Parts;
use http::{HeaderName, HeaderValue, Request, StatusCode};
use pretty_assertions::assert_eq;

fn request() -> Parts {
    Request::post("/orders")
        .header("idempotency-key", "abc123")
        .body(())
        .unwrap()
        .into_parts()
        .0
}

fn handler_output() -> ResponseCapture {
    let mut capture = ResponseCapture::new();
    capture.set_status(StatusCode::CREATED);
    capture
        .headers_mut()
        .insert("x-a", HeaderValue::from_static("a"));
    capture
        .headers_mut()
        .insert("x-b", HeaderValue::from_static("b"));
    capture.write(b"{\"id\":1}");
    capture
}

fn through_storage(format: &dyn Format, captured: &CapturedResponse) -> CapturedResponse {
    let raw = format.serialize(captured).unwrap();
    format.deserialize(&raw).unwrap()
}

#[test]
fn selective_persistence_hides_headers_from_other_processes() {
    let responder = CachedResponder::new().headers(HeaderReplay::Only(vec![]));
    let captured = handler_output().into_captured(responder.persistence());

    let first = responder.respond(&request(), CacheResult::new(false, captured.clone()));
    assert_eq!(first.headers().len(), 2);
    assert_eq!(first.status(), StatusCode::CREATED);

    for format in [&JsonFormat as &dyn Format, &BincodeFormat] {
        let stored = through_storage(format, &captured);
        assert!(stored.headers().is_empty());

        let replay = responder.respond(&request(), CacheResult::new(true, stored));
        assert!(replay.headers().is_empty());
        assert_eq!(replay.status(), StatusCode::CREATED);
        assert_eq!(replay.body(), &Bytes::from_static(b"{\"id\":1}"));
    }
}

#[test]
fn allow_listed_replay_after_round_trip() {
    let responder =
        CachedResponder::new().headers(HeaderReplay::Only(vec![HeaderName::from_static("x-a")]));
    let captured = handler_output().into_captured(responder.persistence());
    let stored = through_storage(&JsonFormat, &captured);

    let replay = responder.respond(&request(), CacheResult::new(true, stored));

    assert_eq!(replay.headers().len(), 1);
    assert_eq!(replay.headers()["x-a"], "a");
}

#[test]
fn override_keeps_real_status_out_of_storage() {
    let responder = CachedResponder::new().override_status(StatusCode::OK);
    let captured = handler_output().into_captured(responder.persistence());

    assert_eq!(captured.status(), Some(StatusCode::CREATED));
    assert_eq!(through_storage(&BincodeFormat, &captured).status(), None);

    let fresh = responder.respond(&request(), CacheResult::new(false, captured.clone()));
    let replay = responder.respond(
        &request(),
        CacheResult::new(true, through_storage(&BincodeFormat, &captured)),
    );
    assert_eq!(fresh.status(), StatusCode::OK);
    assert_eq!(replay.status(), StatusCode::OK);
}
