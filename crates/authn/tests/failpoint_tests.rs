#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the key cache.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p setto-authn --features failpoints --test failpoint_tests
//! ```
//!
//! Fail points are process-global, so each test holds a `FailScenario`,
//! which serializes the tests that use one.

use std::{sync::Arc, time::Duration};

use jsonwebtoken::Algorithm;
use setto_authn::{
    AlgorithmPolicy, AuthError, DEFAULT_MIN_REFRESH_INTERVAL, TokenVerifier, VerifierConfig,
    testutil::{TEST_ISSUER, TEST_JWKS_URL, TestKey, TokenBuilder, key_set, memory_verifier},
};
use setto_keys::{FetchError, KeySource, MemoryKeySource};

const FAIL_POINT: &str = "key-cache-before-fetch";

#[tokio::test]
async fn cold_fetch_failpoint_surfaces_as_source_failure() {
    let scenario = fail::FailScenario::setup();
    let key = TestKey::ed25519("k1");
    let (verifier, source) = memory_verifier(&[&key]);

    fail::cfg(FAIL_POINT, "return").expect("failed to configure fail point");

    let err = verifier
        .verify_id_token(&TokenBuilder::new().sign(&key))
        .await
        .expect_err("fetch should fail when the fail point is active");

    assert!(matches!(err, AuthError::SourceFetchFailed { source: FetchError::Transport { .. } }));
    assert!(err.is_transient());
    assert_eq!(source.fetch_count(), 0);
    assert_eq!(verifier.key_cache().stats().refresh_errors, 1);

    scenario.teardown();
}

#[tokio::test]
async fn fetch_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let key = TestKey::ed25519("k1");
    let (verifier, source) = memory_verifier(&[&key]);

    let result = verifier.verify_id_token(&TokenBuilder::new().sign(&key)).await;

    assert!(result.is_ok(), "fetch should succeed without fail point: {result:?}");
    assert_eq!(source.fetch_count(), 1);

    scenario.teardown();
}

#[tokio::test(start_paused = true)]
async fn injected_refresh_failure_keeps_throttle_window() {
    let scenario = fail::FailScenario::setup();
    let k1 = TestKey::ed25519("k1");
    let k2 = TestKey::ed25519("k2");
    let (verifier, source) = memory_verifier(&[&k1]);
    verifier.verify_id_token(&TokenBuilder::new().sign(&k1)).await.expect("warm-up");
    tokio::time::advance(DEFAULT_MIN_REFRESH_INTERVAL + Duration::from_secs(1)).await;
    source.set_key_set(key_set(&[&k1, &k2]));

    fail::cfg(FAIL_POINT, "1*return").expect("failed to configure fail point");

    let token = TokenBuilder::new().sign(&k2);
    assert!(matches!(
        verifier.verify_id_token(&token).await,
        Err(AuthError::SourceFetchFailed { .. })
    ));
    // The failed refresh still counts against the window.
    assert!(matches!(verifier.verify_id_token(&token).await, Err(AuthError::KeyNotFound { .. })));
    assert_eq!(source.fetch_count(), 1);

    tokio::time::advance(DEFAULT_MIN_REFRESH_INTERVAL + Duration::from_secs(1)).await;
    verifier.verify_id_token(&token).await.expect("retry once the window closes");
    assert_eq!(source.fetch_count(), 2);

    scenario.teardown();
}

#[tokio::test(start_paused = true)]
async fn injected_failure_on_stale_refresh_serves_stale_key() {
    let scenario = fail::FailScenario::setup();
    let key = TestKey::ed25519("k1");
    let config = VerifierConfig::builder()
        .jwks_url(TEST_JWKS_URL)
        .issuer(TEST_ISSUER)
        .algorithms(AlgorithmPolicy::new([Algorithm::EdDSA]).expect("policy"))
        .min_refresh_interval(Duration::from_secs(60))
        .max_key_set_age(Duration::from_secs(120))
        .build()
        .expect("config");
    let source = Arc::new(MemoryKeySource::with_key_set(key_set(&[&key])));
    let verifier =
        TokenVerifier::with_key_source(config, Arc::clone(&source) as Arc<dyn KeySource>)
            .expect("verifier");
    verifier.verify_id_token(&TokenBuilder::new().sign(&key)).await.expect("warm-up");

    tokio::time::advance(Duration::from_secs(121)).await;
    fail::cfg(FAIL_POINT, "return").expect("failed to configure fail point");

    let claims = verifier.verify_id_token(&TokenBuilder::new().sign(&key)).await;

    assert!(claims.is_ok(), "stale key should be served: {claims:?}");
    assert_eq!(verifier.key_cache().stats().stale_served, 1);
    assert_eq!(source.fetch_count(), 1);

    scenario.teardown();
}
