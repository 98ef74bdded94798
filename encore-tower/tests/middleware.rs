mod common;

use std::io;
use std::time::Duration;

use bytes::Bytes;
use common::{PaymentHandler, REPLAY_HEADER, UnreachableBackend, request, send};
use encore_moka::MokaBackend;
use encore_tower::{
    CachedResponder, HeaderKeyExtractor, HeaderReplay, Idempotency, IdempotencyKey, KeyError,
    error_handler_fn,
};
use http::request::Parts;
use http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body_util::Full;
use pretty_assertions::assert_eq;
use tower::{Layer, ServiceExt, service_fn};

fn backend() -> MokaBackend {
    MokaBackend::builder().max_entries(1_000).build()
}

fn replay_marked() -> CachedResponder {
    CachedResponder::new().replay_header(HeaderName::from_static(REPLAY_HEADER))
}

fn payments() -> Idempotency<MokaBackend> {
    Idempotency::builder("payments")
        .backend(backend())
        .responder(replay_marked())
        .build()
}

#[tokio::test]
async fn test_repeated_key_replays_first_response() {
    let handler = PaymentHandler::default();
    let service = payments().layer(handler.clone());

    let first = send(service.clone(), request(Some("abc123"))).await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.body, Bytes::from_static(b"{\"id\":1}"));
    assert!(!first.replayed());

    let second = send(service, request(Some("abc123"))).await;
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(second.body, Bytes::from_static(b"{\"id\":1}"));
    assert_eq!(second.header("content-type"), Some("application/json"));
    assert_eq!(second.header("x-request-id"), Some("req-1"));
    assert!(second.replayed());

    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_requests_without_key_pass_through() {
    let handler = PaymentHandler::default();
    let backend = backend();
    let layer = Idempotency::builder("payments")
        .backend(backend.clone())
        .build();
    let service = layer.layer(handler.clone());

    let first = send(service.clone(), request(None)).await;
    let second = send(service, request(None)).await;

    assert_eq!(first.json()["id"], 1);
    assert_eq!(second.json()["id"], 2);
    assert_eq!(handler.calls(), 2);

    backend.cache().run_pending_tasks().await;
    assert_eq!(backend.cache().entry_count(), 0);
}

#[tokio::test]
async fn test_distinct_keys_execute_separately() {
    let handler = PaymentHandler::default();
    let service = payments().layer(handler.clone());

    let first = send(service.clone(), request(Some("a"))).await;
    let second = send(service.clone(), request(Some("b"))).await;
    let again = send(service, request(Some("a"))).await;

    assert_eq!(first.json()["id"], 1);
    assert_eq!(second.json()["id"], 2);
    assert_eq!(again.json()["id"], 1);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_run_handler_once() {
    let handler = PaymentHandler::slow(Duration::from_millis(100));
    let service = payments().layer(handler.clone());

    let tasks: Vec<_> = (0..8)
        .map(|_| tokio::spawn(send(service.clone(), request(Some("same")))))
        .collect();

    let mut replayed = 0;
    for task in tasks {
        let reply = task.await.unwrap();
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.json()["id"], 1);
        if reply.replayed() {
            replayed += 1;
        }
    }

    assert_eq!(replayed, 7);
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_replays_only_allowed_headers() {
    let handler = PaymentHandler::default();
    let layer = Idempotency::builder("payments")
        .backend(backend())
        .responder(
            replay_marked().headers(HeaderReplay::Only(vec![HeaderName::from_static(
                "content-type",
            )])),
        )
        .build();
    let service = layer.layer(handler.clone());

    let fresh = send(service.clone(), request(Some("k"))).await;
    assert_eq!(fresh.header("x-request-id"), Some("req-1"));
    assert_eq!(fresh.header("content-type"), Some("application/json"));

    let replay = send(service, request(Some("k"))).await;
    assert_eq!(replay.header("x-request-id"), None);
    assert_eq!(replay.header("content-type"), Some("application/json"));
    assert_eq!(replay.body, fresh.body);
}

#[tokio::test]
async fn test_status_override_applies_to_every_response() {
    let handler = PaymentHandler::default();
    let layer = Idempotency::builder("payments")
        .backend(backend())
        .responder(CachedResponder::new().override_status(StatusCode::OK))
        .build();
    let service = layer.layer(handler.clone());

    let fresh = send(service.clone(), request(Some("k"))).await;
    let replay = send(service, request(Some("k"))).await;

    assert_eq!(fresh.status, StatusCode::OK);
    assert_eq!(replay.status, StatusCode::OK);
    assert_eq!(replay.json()["id"], 1);
}

#[tokio::test]
async fn test_instances_sharing_storage_see_persisted_fields_only() {
    let storage = backend();
    let responder = || {
        replay_marked().headers(HeaderReplay::Only(vec![HeaderName::from_static(
            "content-type",
        )]))
    };
    let first_instance = Idempotency::builder("payments")
        .backend(storage.clone())
        .responder(responder())
        .build();
    let second_instance = Idempotency::builder("payments")
        .backend(storage)
        .responder(responder())
        .build();

    let first_handler = PaymentHandler::default();
    let second_handler = PaymentHandler::default();

    let fresh = send(
        first_instance.layer(first_handler.clone()),
        request(Some("shared")),
    )
    .await;
    let replay = send(
        second_instance.layer(second_handler.clone()),
        request(Some("shared")),
    )
    .await;

    assert_eq!(fresh.header("x-request-id"), Some("req-1"));
    assert!(replay.replayed());
    assert_eq!(replay.header("x-request-id"), None);
    assert_eq!(replay.status, StatusCode::CREATED);
    assert_eq!(replay.json()["id"], 1);
    assert_eq!(first_handler.calls(), 1);
    assert_eq!(second_handler.calls(), 0);
}

#[tokio::test]
async fn test_layer_names_isolate_keys() {
    let storage = backend();
    let payments = Idempotency::builder("payments")
        .backend(storage.clone())
        .build();
    let refunds = Idempotency::builder("refunds").backend(storage).build();
    let handler = PaymentHandler::default();

    send(payments.layer(handler.clone()), request(Some("k"))).await;
    let other = send(refunds.layer(handler.clone()), request(Some("k"))).await;

    assert_eq!(other.json()["id"], 2);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_custom_key_header_and_extractor() {
    let handler = PaymentHandler::default();
    let by_header = Idempotency::builder("payments")
        .backend(backend())
        .key_header(HeaderName::from_static("x-dedup"))
        .build()
        .layer(handler.clone());

    let with_custom = |key: &str| {
        let mut req = request(None);
        req.headers_mut().insert("x-dedup", key.parse().unwrap());
        req
    };
    send(by_header.clone(), with_custom("one")).await;
    send(by_header.clone(), with_custom("one")).await;
    // The default header is not consulted anymore.
    send(by_header, request(Some("one"))).await;
    assert_eq!(handler.calls(), 2);

    let handler = PaymentHandler::default();
    let by_path = Idempotency::builder("payments")
        .backend(backend())
        .key_extractor(|parts: &Parts| -> Result<IdempotencyKey, KeyError> {
            Ok(IdempotencyKey::from(parts.uri.path()))
        })
        .build()
        .layer(handler.clone());
    send(by_path.clone(), request(None)).await;
    send(by_path, request(None)).await;
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_rejected_key_answers_with_client_error() {
    let handler = PaymentHandler::default();
    let service = Idempotency::builder("payments")
        .backend(backend())
        .key_extractor(HeaderKeyExtractor::default().max_length(8))
        .build()
        .layer(handler.clone());

    let reply = send(service, request(Some("way-too-long-key"))).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.header("content-type"), Some("application/json"));
    assert_eq!(
        reply.json(),
        serde_json::json!({ "message": "idempotency key is 16 bytes long, at most 8 allowed" })
    );
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_non_utf8_keys_are_rejected_not_merged() {
    let handler = PaymentHandler::default();
    let service = payments().layer(handler.clone());

    for raw in [&b"k\xff"[..], &b"k\xfe"[..]] {
        let mut req = request(None);
        req.headers_mut()
            .insert("idempotency-key", HeaderValue::from_bytes(raw).unwrap());
        let reply = send(service.clone(), req).await;

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            reply.json(),
            serde_json::json!({ "message": "idempotency key is not valid UTF-8" })
        );
    }
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_opaque_header_bytes_replay_unchanged() {
    let disposition = HeaderValue::from_bytes(b"attachment; filename=\"caf\xe9.txt\"").unwrap();
    let handler = {
        let disposition = disposition.clone();
        service_fn(move |_req: Request<Full<Bytes>>| {
            let disposition = disposition.clone();
            async move {
                let mut response = Response::new(Full::new(Bytes::from_static(b"file")));
                response
                    .headers_mut()
                    .insert("content-disposition", disposition);
                Ok::<_, io::Error>(response)
            }
        })
    };
    let service = payments().layer(handler);

    let fresh = send(service.clone(), request(Some("download"))).await;
    let replay = send(service, request(Some("download"))).await;

    assert!(replay.replayed());
    assert_eq!(fresh.headers["content-disposition"], disposition);
    assert_eq!(replay.headers["content-disposition"], disposition);
}

#[tokio::test]
async fn test_custom_client_error_handler() {
    let service = Idempotency::builder("payments")
        .backend(backend())
        .key_extractor(|_: &Parts| -> Result<IdempotencyKey, KeyError> {
            Err(KeyError::invalid("keys must be UUIDs"))
        })
        .client_error_handler(error_handler_fn(|_request, error| {
            Response::builder()
                .status(StatusCode::UNPROCESSABLE_ENTITY)
                .body(Bytes::from(error.to_string()))
                .unwrap()
        }))
        .build()
        .layer(PaymentHandler::default());

    let reply = send(service, request(Some("nope"))).await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.body, Bytes::from_static(b"keys must be UUIDs"));
}

#[tokio::test]
async fn test_storage_failure_answers_with_server_error() {
    let handler = PaymentHandler::default();
    let service = Idempotency::builder("payments")
        .backend(UnreachableBackend)
        .build()
        .layer(handler.clone());

    let reply = send(service, request(Some("k"))).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = reply.json()["message"].as_str().unwrap().to_owned();
    assert!(message.contains("storage unreachable"), "{message}");
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_handler_failure_is_reported_only_for_keyed_requests() {
    let failing = service_fn(|_req: Request<Full<Bytes>>| async {
        Err::<Response<Full<Bytes>>, io::Error>(io::Error::other("database is down"))
    });
    let layer = Idempotency::builder("payments")
        .backend(backend())
        .server_error_handler(error_handler_fn(|_request, error| {
            Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .body(Bytes::from(error.to_string()))
                .unwrap()
        }))
        .build();
    let service = layer.layer(failing);

    let keyed = service.clone().oneshot(request(Some("k"))).await.unwrap();
    assert_eq!(keyed.status(), StatusCode::SERVICE_UNAVAILABLE);

    let bypass = service.oneshot(request(None)).await;
    assert_eq!(bypass.unwrap_err().to_string(), "database is down");
}

#[tokio::test]
async fn test_failed_execution_is_not_stored() {
    let storage = backend();
    let failing = service_fn(|_req: Request<Full<Bytes>>| async {
        Err::<Response<Full<Bytes>>, io::Error>(io::Error::other("flaky"))
    });
    let layer = Idempotency::builder("payments")
        .backend(storage.clone())
        .build();

    let reply = layer.layer(failing).oneshot(request(Some("k"))).await.unwrap();
    assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let handler = PaymentHandler::default();
    let retry = send(layer.layer(handler.clone()), request(Some("k"))).await;
    assert_eq!(retry.status, StatusCode::CREATED);
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_ttl_opens_a_new_window() {
    let handler = PaymentHandler::default();
    let service = Idempotency::builder("payments")
        .backend(backend())
        .ttl(Duration::from_millis(100))
        .build()
        .layer(handler.clone());

    send(service.clone(), request(Some("k"))).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    let later = send(service, request(Some("k"))).await;

    assert_eq!(later.json()["id"], 2);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn test_invalidation_opens_a_new_window() {
    let handler = PaymentHandler::default();
    let layer = payments();
    let service = layer.layer(handler.clone());

    send(service.clone(), request(Some("k"))).await;
    let key = layer.actor().key(&IdempotencyKey::from("k"));
    layer.actor().invalidate(&key).await.unwrap();
    let later = send(service, request(Some("k"))).await;

    assert_eq!(later.json()["id"], 2);
    assert!(!later.replayed());
}

#[tokio::test]
async fn test_waiting_past_timeout_is_a_server_error() {
    let handler = PaymentHandler::slow(Duration::from_millis(300));
    let service = Idempotency::builder("payments")
        .backend(backend())
        .wait_timeout(Duration::from_millis(50))
        .build()
        .layer(handler.clone());

    let leader = tokio::spawn(send(service.clone(), request(Some("k"))));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let waiter = send(service, request(Some("k"))).await;

    assert_eq!(waiter.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(leader.await.unwrap().status, StatusCode::CREATED);
    assert_eq!(handler.calls(), 1);
}
