//! Identity token verification.
//!
//! [`TokenVerifier`] checks a token in a fixed order and stops at the first
//! failure:
//!
//! 1. **Header**: three segments, an accepted `alg`, a well-formed `kid`
//! 2. **Key**: resolve `kid` through the [`KeyCache`], refreshing on a miss
//!    unless the refresh throttle is closed
//! 3. **Signature**: verify with the resolved key; `exp` and `nbf` are
//!    enforced when present
//! 4. **Claims**: `iss` must equal the configured issuer exactly
//!
//! # Example
//!
//! ```no_run
//! use setto_authn::TokenVerifier;
//!
//! # async fn example(id_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = TokenVerifier::new(
//!     "https://wallet.settopay.com/.well-known/jwks.json",
//!     "https://wallet.settopay.com",
//! )?;
//!
//! let claims = verifier.verify_id_token(id_token).await?;
//! println!("verified user {}", claims.user_id());
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use setto_keys::{HttpKeySource, KeySource, SigningKey};
use tokio_util::sync::CancellationToken;

use crate::{
    config::VerifierConfig,
    error::{AuthError, ConfigError},
    key_cache::KeyCache,
    validation::{AlgorithmPolicy, validate_kid},
};

/// Verified identity token claims.
///
/// Fields the token does not carry (or carries with the wrong JSON type)
/// take their zero value: empty string, `false`, or the Unix epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Claims {
    user_id: String,
    email: String,
    email_verified: bool,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Claims {
    fn from_payload(payload: &Map<String, Value>) -> Self {
        let string = |name: &str| {
            payload.get(name).and_then(Value::as_str).unwrap_or_default().to_owned()
        };
        Self {
            user_id: string("sub"),
            email: string("email"),
            email_verified: payload
                .get("email_verified")
                .and_then(Value::as_bool)
                .unwrap_or_default(),
            issued_at: timestamp(payload.get("iat")),
            expires_at: timestamp(payload.get("exp")),
        }
    }

    /// The wallet user ID (`sub`).
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The user's email address (`email`), empty if absent.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Whether the wallet has verified the email address (`email_verified`).
    #[must_use]
    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    /// When the token was issued (`iat`).
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the token expires (`exp`).
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// NumericDate to UTC; fractional seconds are truncated.
fn timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|secs| secs as i64)))
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
    kid: Option<String>,
}

/// The parts of a token header the verifier acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// The accepted signature algorithm.
    pub alg: Algorithm,
    /// The validated key ID.
    pub kid: String,
}

/// Decodes and validates a token header without verifying the signature.
///
/// # Errors
///
/// Returns [`AuthError::TokenInvalid`] if the token does not have three
/// segments, the header is not base64url JSON, the algorithm is rejected by
/// `policy`, or the `kid` is missing or malformed.
pub fn parse_header(token: &str, policy: &AlgorithmPolicy) -> Result<TokenHeader, AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::token_invalid("token must have three dot-separated segments"));
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| AuthError::token_invalid_with_source("token header is not base64url", e))?;
    let raw: RawHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| AuthError::token_invalid_with_source("token header is not valid JSON", e))?;

    let alg = raw.alg.ok_or_else(|| AuthError::token_invalid("token header has no 'alg'"))?;
    let alg = policy.validate(&alg)?;

    let kid = raw.kid.ok_or_else(|| AuthError::token_invalid("token header has no 'kid'"))?;
    validate_kid(&kid)?;

    Ok(TokenHeader { alg, kid })
}

/// Verifies identity tokens issued by one wallet issuer.
///
/// Create one per issuer and share it (it is `Send + Sync`; wrap in `Arc`
/// to hand it to tasks). The key set is fetched lazily on the first
/// verification, not at construction.
#[derive(Debug)]
pub struct TokenVerifier {
    issuer: String,
    policy: AlgorithmPolicy,
    leeway: Duration,
    key_cache: Arc<KeyCache>,
}

impl TokenVerifier {
    /// Creates a verifier fetching keys over HTTPS, with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL or issuer is empty or invalid, or
    /// the HTTP client cannot be built.
    pub fn new(jwks_url: impl Into<String>, issuer: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_config(VerifierConfig::builder().jwks_url(jwks_url).issuer(issuer).build()?)
    }

    /// Creates a verifier fetching keys over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(config: VerifierConfig) -> Result<Self, ConfigError> {
        let source = HttpKeySource::with_timeout(config.fetch_timeout())
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;
        Self::with_key_source(config, Arc::new(source))
    }

    /// Creates a verifier over a custom key source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_key_source(
        config: VerifierConfig,
        source: Arc<dyn KeySource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let key_cache = Arc::new(KeyCache::new(source, &config));
        Ok(Self {
            issuer: config.issuer,
            policy: config.algorithms,
            leeway: config.leeway,
            key_cache,
        })
    }

    /// Starts periodic background refresh of the key set.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_background_refresh(self, interval: Duration) -> Self {
        let _ = Arc::clone(&self.key_cache).with_refresh_interval(interval);
        self
    }

    /// Returns the expected issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the accepted algorithm policy.
    #[must_use]
    pub fn algorithms(&self) -> &AlgorithmPolicy {
        &self.policy
    }

    /// Returns the key cache, for stats, forced refresh and shutdown.
    #[must_use]
    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    /// Verifies an identity token and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenInvalid`]: malformed token, rejected algorithm or
    ///   `kid`, bad signature, or `nbf` in the future
    /// - [`AuthError::KeyNotFound`]: no key with the token's `kid` after a
    ///   refresh, or with the refresh throttled
    /// - [`AuthError::SourceFetchFailed`]: the key set could not be fetched
    /// - [`AuthError::TokenExpired`]: `exp` has passed
    /// - [`AuthError::IssuerMismatch`]: `iss` differs from the configured issuer
    pub async fn verify_id_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_id_token_with_cancel(token, &CancellationToken::new()).await
    }

    /// Like [`verify_id_token`](Self::verify_id_token), aborting any key set
    /// fetch when `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`verify_id_token`](Self::verify_id_token). A cancelled fetch
    /// surfaces as [`AuthError::SourceFetchFailed`] wrapping
    /// [`FetchError::Cancelled`](setto_keys::FetchError::Cancelled).
    #[tracing::instrument(skip(self, token, cancel), fields(kid = tracing::field::Empty))]
    pub async fn verify_id_token_with_cancel(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Claims, AuthError> {
        self.key_cache.initialize();

        let header = parse_header(token, &self.policy)?;
        tracing::Span::current().record("kid", header.kid.as_str());

        let key = self
            .key_cache
            .lookup(&header.kid, cancel)
            .await?
            .ok_or_else(|| AuthError::key_not_found(header.kid.as_str()))?;

        if let Some(declared) = key.algorithm()
            && declared != header.alg
        {
            return Err(AuthError::token_invalid(format!(
                "token algorithm {:?} does not match the key's declared algorithm {declared:?}",
                header.alg
            )));
        }

        let payload = self.check_signature(token, &key, header.alg)?;

        let actual = payload.get("iss").and_then(Value::as_str).unwrap_or_default();
        if actual != self.issuer {
            return Err(AuthError::issuer_mismatch(self.issuer.as_str(), actual));
        }

        tracing::debug!("identity token verified");
        Ok(Claims::from_payload(&payload))
    }

    /// Verifies an identity token and additionally requires `email_verified`.
    ///
    /// # Errors
    ///
    /// Any error of [`verify_id_token`](Self::verify_id_token), or
    /// [`AuthError::EmailNotVerified`] if the claim is absent or `false`.
    pub async fn verify_id_token_require_email(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_id_token_require_email_with_cancel(token, &CancellationToken::new()).await
    }

    /// Cancellable form of [`verify_id_token_require_email`](Self::verify_id_token_require_email).
    ///
    /// # Errors
    ///
    /// See [`verify_id_token_require_email`](Self::verify_id_token_require_email).
    pub async fn verify_id_token_require_email_with_cancel(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Claims, AuthError> {
        let claims = self.verify_id_token_with_cancel(token, cancel).await?;
        if !claims.email_verified() {
            return Err(AuthError::email_not_verified());
        }
        Ok(claims)
    }

    fn check_signature(
        &self,
        token: &str,
        key: &SigningKey,
        alg: Algorithm,
    ) -> Result<Map<String, Value>, AuthError> {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        // A token without `exp` is accepted; its expiry reads as the epoch.
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, key.decoding_key(), &validation)?;
        Ok(data.claims)
    }
}
