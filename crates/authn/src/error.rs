//! Authentication error types.
//!
//! This module defines errors that can occur while verifying an identity
//! token and while building a verifier from configuration.

use std::sync::Arc;

use setto_keys::{BoxError, FetchError};
use thiserror::Error;

/// Identity token verification errors.
///
/// Every failure is local to the single verification call that produced it.
/// Only [`AuthError::SourceFetchFailed`] is worth retrying; the other variants
/// are deterministic outcomes for the given token and key set.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed token, forbidden or unexpected algorithm, bad `kid`, or a
    /// signature/claims failure other than expiry.
    #[error("Invalid token: {message}")]
    TokenInvalid {
        /// What was wrong with the token.
        message: String,
        /// The underlying decoding or verification error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The token's `exp` is in the past (beyond the configured leeway).
    #[error("Token expired")]
    TokenExpired,

    /// The token's `iss` claim differs from the expected issuer.
    #[error("Issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch {
        /// The issuer the verifier was configured with.
        expected: String,
        /// The issuer found in the token (empty if absent).
        actual: String,
    },

    /// No key with the token's `kid` exists, even after a refresh.
    #[error("Signing key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// The token is valid but its `email_verified` claim is not `true`.
    #[error("Email not verified")]
    EmailNotVerified,

    /// The key set could not be fetched while resolving the signing key.
    #[error("Key source fetch failed: {source}")]
    SourceFetchFailed {
        /// The underlying fetch error.
        #[source]
        source: FetchError,
    },
}

impl AuthError {
    /// Creates a new `TokenInvalid` error with the given message.
    #[must_use]
    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::TokenInvalid { message: message.into(), source: None }
    }

    /// Creates a new `TokenInvalid` error with a message and source error.
    #[must_use]
    pub fn token_invalid_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TokenInvalid { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `TokenExpired` error.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates a new `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IssuerMismatch { expected: expected.into(), actual: actual.into() }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `EmailNotVerified` error.
    #[must_use]
    pub fn email_not_verified() -> Self {
        Self::EmailNotVerified
    }

    /// Creates a new `SourceFetchFailed` error.
    #[must_use]
    pub fn source_fetch_failed(source: FetchError) -> Self {
        Self::SourceFetchFailed { source }
    }

    /// Returns `true` if retrying the same token later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceFetchFailed { .. })
    }
}

impl From<FetchError> for AuthError {
    fn from(err: FetchError) -> Self {
        Self::source_fetch_failed(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let message = match err.kind() {
            ErrorKind::ExpiredSignature => return AuthError::token_expired(),
            ErrorKind::InvalidToken => "malformed token",
            ErrorKind::InvalidSignature => "signature verification failed",
            ErrorKind::ImmatureSignature => "token not yet valid",
            ErrorKind::InvalidAlgorithm => "algorithm does not match the signing key",
            ErrorKind::MissingRequiredClaim(_) => "required claim missing",
            ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                "token segment could not be decoded"
            },
            _ => "token verification failed",
        };
        AuthError::token_invalid_with_source(message, err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised while building a verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required value was not provided or is empty.
    #[error("Missing configuration value: {field}")]
    Missing {
        /// The offending field.
        field: &'static str,
    },

    /// A value is present but unusable.
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A value is below its permitted minimum.
    #[error("Configuration value {field} = {value} is below the minimum of {min}")]
    BelowMinimum {
        /// The offending field.
        field: &'static str,
        /// The minimum permitted value.
        min: String,
        /// The value that was supplied.
        value: String,
    },
}

impl ConfigError {
    /// Creates a new `Invalid` error.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}
