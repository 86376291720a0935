//! HTTP key source tests against a mock JWKS endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use serde_json::json;
use setto_keys::{FetchError, HttpKeySource, KeySource};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

const JWKS_PATH: &str = "/.well-known/jwks.json";

fn jwks_body() -> serde_json::Value {
    json!({
        "keys": [
            {
                "kty": "OKP",
                "kid": "wallet-2026-01",
                "crv": "Ed25519",
                "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
            },
            { "kty": "oct", "kid": "hmac", "k": "c2VjcmV0" }
        ]
    })
}

#[tokio::test]
async fn test_fetch_parses_published_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpKeySource::new().unwrap();
    let keys = source.fetch(&format!("{}{JWKS_PATH}", server.uri())).await.unwrap();

    assert_eq!(keys.key_ids().collect::<Vec<_>>(), vec!["wallet-2026-01"]);
}

#[tokio::test]
async fn test_fetch_maps_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let url = format!("{}{JWKS_PATH}", server.uri());
    let err = HttpKeySource::new().unwrap().fetch(&url).await.unwrap_err();

    match err {
        FetchError::Status { status, url: reported } => {
            assert_eq!(status, 503);
            assert_eq!(reported, url);
        },
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_maps_malformed_body_to_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a key set"))
        .mount(&server)
        .await;

    let err = HttpKeySource::new()
        .unwrap()
        .fetch(&format!("{}{JWKS_PATH}", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_slow_endpoint_is_transport_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(jwks_body()).set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let source = HttpKeySource::with_timeout(Duration::from_millis(100)).unwrap();
    let err = source.fetch(&format!("{}{JWKS_PATH}", server.uri())).await.unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_unreachable_host_is_transport_error() {
    let err = HttpKeySource::new()
        .unwrap()
        .fetch(&format!("http://127.0.0.1:1{JWKS_PATH}"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }), "got {err:?}");
}
