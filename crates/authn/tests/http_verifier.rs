//! End-to-end verification against a key set served over HTTP.
#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::time::Duration;

use jsonwebtoken::Algorithm;
use setto_authn::{
    AlgorithmPolicy, AuthError, TokenVerifier, VerifierConfig, assert_auth_error,
    testutil::{TestKey, TokenBuilder, jwks_document},
};
use setto_keys::FetchError;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

const JWKS_PATH: &str = "/.well-known/jwks.json";

fn verifier_for(server: &MockServer) -> TokenVerifier {
    let config = VerifierConfig::builder()
        .jwks_url(format!("{}{JWKS_PATH}", server.uri()))
        .issuer(server.uri())
        .algorithms(AlgorithmPolicy::new([Algorithm::RS256, Algorithm::EdDSA]).expect("policy"))
        .fetch_timeout(Duration::from_secs(2))
        .build()
        .expect("config");
    TokenVerifier::from_config(config).expect("verifier")
}

#[tokio::test]
async fn verifies_rsa_token_from_served_key_set() {
    let server = MockServer::start().await;
    let key = TestKey::rsa("wallet-rsa");
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(&[&key])))
        .expect(1)
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);

    let token = TokenBuilder::new()
        .issuer(&server.uri())
        .subject("wallet-user-7")
        .email("erin@example.com")
        .email_verified(true)
        .sign(&key);

    let claims = verifier.verify_id_token_require_email(&token).await.expect("verify");
    assert_eq!(claims.user_id(), "wallet-user-7");

    // Second verification is served from the cache; `expect(1)` checks on drop.
    verifier.verify_id_token(&token).await.expect("cached verify");
}

#[tokio::test]
async fn server_error_surfaces_as_transient_fetch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);
    let key = TestKey::ed25519("k1");

    let err = verifier
        .verify_id_token(&TokenBuilder::new().issuer(&server.uri()).sign(&key))
        .await
        .unwrap_err();

    assert!(
        matches!(&err, AuthError::SourceFetchFailed { source: FetchError::Status { status: 503, .. } }),
        "got {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn key_absent_from_served_set_is_not_found() {
    let server = MockServer::start().await;
    let published = TestKey::ed25519("published");
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(&[&published])))
        .mount(&server)
        .await;
    let verifier = verifier_for(&server);
    let stranger = TestKey::ed25519("stranger");

    let token = TokenBuilder::new().issuer(&server.uri()).sign(&stranger);

    assert_auth_error!(verifier.verify_id_token(&token).await, KeyNotFound);
}

#[tokio::test]
async fn construction_rejects_bad_configuration() {
    assert!(TokenVerifier::new("", "https://wallet.example").is_err());
    assert!(TokenVerifier::new("ftp://wallet.example/jwks", "https://wallet.example").is_err());
    assert!(TokenVerifier::new("https://wallet.example/jwks", "").is_err());
}

#[tokio::test]
async fn construction_performs_no_io() {
    let verifier = TokenVerifier::new("https://unreachable.invalid/jwks", "https://unreachable.invalid")
        .expect("valid configuration");

    assert!(!verifier.key_cache().is_initialized());
    assert_eq!(verifier.issuer(), "https://unreachable.invalid");
    assert_eq!(verifier.algorithms(), &AlgorithmPolicy::default());
}
