//! Shared test utilities for identity token testing.
//!
//! This module provides helpers for generating Ed25519 and RSA key pairs,
//! publishing them as JWKs, minting signed identity tokens, and crafting raw
//! JWT strings for attack testing. It is feature-gated behind `testutil` to
//! prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! setto-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use setto_authn::testutil::{TestKey, TokenBuilder, key_set};
//! ```

use std::sync::{Arc, OnceLock};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand_core::OsRng;
use rsa::{
    RsaPrivateKey,
    pkcs1::{EncodeRsaPrivateKey, LineEnding},
    traits::PublicKeyParts,
};
use serde_json::{Map, Value, json};
use setto_keys::{KeySet, MemoryKeySource, SigningKey};
use zeroize::Zeroizing;

use crate::{config::VerifierConfig, jwt::TokenVerifier};

/// Issuer used by [`TokenBuilder`] and [`test_config`] unless overridden.
pub const TEST_ISSUER: &str = "https://wallet.example";

/// Key set URL used by [`test_config`].
pub const TEST_JWKS_URL: &str = "https://wallet.example/.well-known/jwks.json";

/// Generates a test Ed25519 key pair.
///
/// Returns `(pkcs8_der, public_key_base64url)` where:
/// - `pkcs8_der` is the private key in PKCS#8 DER format wrapped in [`Zeroizing`] (suitable for
///   [`EncodingKey::from_ed_der`])
/// - `public_key_base64url` is the 32-byte public key encoded as base64url without padding
///   (suitable for the `x` member of an `OKP` JWK)
///
/// Each call generates a fresh random key pair.
pub fn generate_test_keypair() -> (Zeroizing<Vec<u8>>, String) {
    let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
    let public_key_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    (pkcs8_der, public_key_b64)
}

/// Private PEM plus base64url `n` and `e` of the process-wide RSA test key.
struct RsaMaterial {
    private_pem: Zeroizing<String>,
    modulus: String,
    exponent: String,
}

/// RSA-2048 generation is slow, so every RSA [`TestKey`] shares one key pair.
fn shared_rsa_material() -> &'static RsaMaterial {
    static MATERIAL: OnceLock<RsaMaterial> = OnceLock::new();
    MATERIAL.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut OsRng, 2048).expect("RSA key generation");
        RsaMaterial {
            private_pem: key.to_pkcs1_pem(LineEnding::LF).expect("RSA PEM encoding"),
            modulus: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    })
}

/// A signing key pair plus its published JWK.
pub struct TestKey {
    kid: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    jwk: Value,
}

impl TestKey {
    /// Creates a fresh Ed25519 key published as an `OKP` JWK with `alg: EdDSA`.
    pub fn ed25519(kid: &str) -> Self {
        let (pkcs8_der, public_key_b64) = generate_test_keypair();
        Self {
            kid: kid.to_owned(),
            algorithm: Algorithm::EdDSA,
            encoding_key: EncodingKey::from_ed_der(&pkcs8_der),
            jwk: json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "kid": kid,
                "alg": "EdDSA",
                "use": "sig",
                "x": public_key_b64,
            }),
        }
    }

    /// Creates an RSA key published as an `RSA` JWK with `alg: RS256`.
    ///
    /// All RSA test keys share the same key material; use Ed25519 keys when
    /// a test needs cryptographically distinct keys.
    ///
    /// # Panics
    ///
    /// Panics if RSA key generation or PEM encoding fails.
    pub fn rsa(kid: &str) -> Self {
        let material = shared_rsa_material();
        Self {
            kid: kid.to_owned(),
            algorithm: Algorithm::RS256,
            encoding_key: EncodingKey::from_rsa_pem(material.private_pem.as_bytes())
                .expect("RSA encoding key"),
            jwk: json!({
                "kty": "RSA",
                "kid": kid,
                "alg": "RS256",
                "use": "sig",
                "n": material.modulus,
                "e": material.exponent,
            }),
        }
    }

    /// Returns the key ID.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Returns the algorithm tokens are signed with.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Returns the published JWK.
    pub fn jwk(&self) -> &Value {
        &self.jwk
    }

    /// Parses the published JWK into a verification key.
    ///
    /// # Panics
    ///
    /// Panics if the JWK is rejected (should not happen for keys built here).
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_jwk_value(&self.jwk).expect("test JWK must parse")
    }

    /// Signs `claims` with this key, setting `alg` and `kid` in the header.
    ///
    /// # Panics
    ///
    /// Panics if JWT encoding fails.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Signs `claims` with this key under an arbitrary header.
    ///
    /// # Panics
    ///
    /// Panics if JWT encoding fails, e.g. when the header algorithm does
    /// not match the key family.
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        jsonwebtoken::encode(header, claims, &self.encoding_key).expect("Failed to encode test JWT")
    }
}

/// Builds a [`KeySet`] holding the given keys' public halves.
pub fn key_set(keys: &[&TestKey]) -> KeySet {
    KeySet::new(keys.iter().map(|key| key.signing_key()))
}

/// Builds a JWKS document (`{"keys": [...]}`) for the given keys.
pub fn jwks_document(keys: &[&TestKey]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk.clone()).collect::<Vec<_>>() })
}

/// Fluent builder for identity token payloads.
///
/// Defaults: issuer [`TEST_ISSUER`], subject `user-123`, issued now,
/// expiring in one hour, no email claims.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    claims: Map<String, Value>,
}

impl Default for TokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBuilder {
    /// Creates a builder with the default claims.
    pub fn new() -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("iss".into(), TEST_ISSUER.into());
        claims.insert("sub".into(), "user-123".into());
        claims.insert("iat".into(), now.into());
        claims.insert("exp".into(), (now + 3600).into());
        Self { claims }
    }

    /// Sets the `iss` claim.
    #[must_use]
    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", issuer)
    }

    /// Sets the `sub` claim.
    #[must_use]
    pub fn subject(self, subject: &str) -> Self {
        self.claim("sub", subject)
    }

    /// Sets the `email` claim.
    #[must_use]
    pub fn email(self, email: &str) -> Self {
        self.claim("email", email)
    }

    /// Sets the `email_verified` claim.
    #[must_use]
    pub fn email_verified(self, verified: bool) -> Self {
        self.claim("email_verified", verified)
    }

    /// Sets `exp` relative to now (negative values produce expired tokens).
    #[must_use]
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", Utc::now().timestamp() + seconds)
    }

    /// Sets `nbf` relative to now.
    #[must_use]
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.claim("nbf", Utc::now().timestamp() + seconds)
    }

    /// Sets an arbitrary claim.
    #[must_use]
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_owned(), value.into());
        self
    }

    /// Removes a claim.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Returns the payload as JSON.
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Signs the payload with `key`.
    pub fn sign(&self, key: &TestKey) -> String {
        key.sign(&self.claims())
    }
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &Value, payload_json: &Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Verifier configuration for [`TEST_JWKS_URL`] / [`TEST_ISSUER`] accepting `algorithms`.
///
/// # Panics
///
/// Panics if `algorithms` is empty or contains an HMAC algorithm.
pub fn test_config(algorithms: impl IntoIterator<Item = Algorithm>) -> VerifierConfig {
    VerifierConfig::builder()
        .jwks_url(TEST_JWKS_URL)
        .issuer(TEST_ISSUER)
        .algorithms(crate::validation::AlgorithmPolicy::new(algorithms).expect("valid policy"))
        .build()
        .expect("valid test config")
}

/// A verifier over an in-memory source serving `keys`, accepting EdDSA and RS256.
///
/// Returns the source as well so tests can rotate keys and count fetches.
///
/// # Panics
///
/// Panics if the verifier cannot be built.
pub fn memory_verifier(keys: &[&TestKey]) -> (TokenVerifier, Arc<MemoryKeySource>) {
    let source = Arc::new(MemoryKeySource::with_key_set(key_set(keys)));
    let verifier = TokenVerifier::with_key_source(
        test_config([Algorithm::EdDSA, Algorithm::RS256]),
        Arc::clone(&source) as Arc<dyn setto_keys::KeySource>,
    )
    .expect("valid verifier");
    (verifier, source)
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given [`AuthError`] variant.
///
/// Works with any `AuthError` variant. On failure, prints the expected variant
/// and the actual result for debugging.
///
/// [`AuthError`]: crate::error::AuthError
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use setto_authn::assert_auth_error;
/// use setto_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_keypair_produces_valid_key() {
        let (pkcs8_der, public_key_b64) = generate_test_keypair();
        // PKCS#8 DER for Ed25519 is 48 bytes (16 header + 32 key)
        assert_eq!(pkcs8_der.len(), 48);
        // Base64url of 32 bytes = 43 characters (no padding)
        assert_eq!(public_key_b64.len(), 43);
    }

    #[test]
    fn test_ed25519_keys_are_distinct() {
        let a = TestKey::ed25519("a");
        let b = TestKey::ed25519("b");
        assert_ne!(a.jwk()["x"], b.jwk()["x"]);
    }

    #[test]
    fn test_jwks_document_round_trips_through_key_set() {
        let ed = TestKey::ed25519("ed");
        let rsa = TestKey::rsa("rsa");
        let body = serde_json::to_vec(&jwks_document(&[&ed, &rsa])).expect("serialize");

        let set = KeySet::from_json(&body).expect("parse");

        assert_eq!(set.key_ids().collect::<Vec<_>>(), vec!["ed", "rsa"]);
        assert_eq!(set.find("rsa").expect("rsa key").algorithm(), Some(Algorithm::RS256));
    }

    #[test]
    fn test_signed_token_carries_kid_and_alg() {
        let key = TestKey::ed25519("kid-001");
        let token = TokenBuilder::new().sign(&key);

        let header = jsonwebtoken::decode_header(&token).expect("header");
        assert_eq!(header.kid.as_deref(), Some("kid-001"));
        assert_eq!(header.alg, Algorithm::EdDSA);
    }

    #[test]
    fn test_token_builder_overrides() {
        let claims = TokenBuilder::new()
            .subject("u-9")
            .email("a@b.example")
            .email_verified(true)
            .without("iat")
            .claims();

        assert_eq!(claims["sub"], "u-9");
        assert_eq!(claims["email"], "a@b.example");
        assert_eq!(claims["email_verified"], true);
        assert!(claims.get("iat").is_none());
    }

    #[test]
    fn test_craft_raw_jwt_format() {
        let header = json!({"alg": "none", "typ": "JWT"});
        let payload = json!({"sub": "test"});
        let jwt = craft_raw_jwt(&header, &payload);
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty(), "signature should be empty for raw JWTs");
    }

    #[test]
    fn test_assert_auth_error_with_message() {
        use crate::error::AuthError;
        let result: Result<(), AuthError> = Err(AuthError::key_not_found("kid-001"));
        assert_auth_error!(result, KeyNotFound, "key should be unknown");
    }
}
