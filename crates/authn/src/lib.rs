//! # Setto Identity Token Verification
//!
//! Verifies identity tokens issued by the Setto wallet against the wallet's
//! published key set.
//!
//! This crate provides:
//! - **Token verification**: header checks, signature, expiry and issuer
//! - **Key cache**: throttled, generation-ordered JWKS snapshot cache
//! - **Algorithm policy**: pinned asymmetric algorithm families
//!
//! ## Features
//!
//! - `none` and HMAC algorithms are always rejected
//! - Unknown key IDs trigger at most one refetch per refresh interval
//! - A stale key set keeps serving known keys while the source is down
//!
//! ## Example
//!
//! ```no_run
//! use setto_authn::{AuthError, TokenVerifier};
//!
//! # async fn example(id_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = TokenVerifier::new(
//!     "https://wallet.settopay.com/.well-known/jwks.json",
//!     "https://wallet.settopay.com",
//! )?;
//!
//! match verifier.verify_id_token_require_email(id_token).await {
//!     Ok(claims) => println!("{} <{}>", claims.user_id(), claims.email()),
//!     Err(AuthError::TokenExpired) => println!("ask the user to sign in again"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Verifier configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Token verification and claims.
pub mod jwt;
/// Throttled key set cache.
pub mod key_cache;
/// Algorithm and key ID validation.
pub mod validation;

/// Test helpers for keys, JWKs and tokens.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

pub use config::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_LEEWAY, DEFAULT_MAX_KEY_SET_AGE, DEFAULT_MIN_REFRESH_INTERVAL,
    VerifierConfig,
};
pub use error::{AuthError, ConfigError, Result};
pub use jwt::{Claims, TokenVerifier};
pub use key_cache::{CacheStats, KeyCache};
pub use validation::{
    AlgorithmPolicy, DEFAULT_ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, MAX_KID_LENGTH,
    validate_kid,
};
