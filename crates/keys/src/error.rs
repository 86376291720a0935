//! Key set fetch error types.
//!
//! Every failure to obtain a usable key set document from a [`KeySource`]
//! maps to one of the [`FetchError`] variants below. Callers use these to
//! tell "the source is unreachable or broken" apart from "this key-id does
//! not exist", which is reported separately as an absent lookup result.
//!
//! [`KeySource`]: crate::KeySource

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while fetching a key set.
///
/// Errors preserve their source chain via `#[source]`, so diagnostics can
/// display the underlying transport or JSON failure.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, TLS, reset).
    #[error("Key set transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
        /// The underlying error that caused the failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The key set endpoint answered with a non-success status.
    #[error("Key set endpoint {url} returned HTTP {status}")]
    Status {
        /// The URL that was fetched.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body was not a usable key set document.
    #[error("Key set parse error: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
        /// The underlying error that caused the failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The fetch exceeded its time budget.
    #[error("Key set fetch timed out after {after:?}")]
    Timeout {
        /// The budget that was exceeded.
        after: Duration,
    },

    /// The caller cancelled the fetch before it completed.
    #[error("Key set fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Creates a new `Transport` error with the given message.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Creates a new `Transport` error with a message and source error.
    #[must_use]
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Status` error.
    #[must_use]
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status { url: url.into(), status }
    }

    /// Creates a new `Parse` error with the given message.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into(), source: None }
    }

    /// Creates a new `Parse` error with a message and source error.
    #[must_use]
    pub fn parse_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Parse { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }

    /// Creates a new `Cancelled` error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Returns `true` if a later attempt could plausibly succeed.
    ///
    /// Transport failures, timeouts, `429` and `5xx` responses are transient.
    /// Parse failures and other statuses indicate a definitive answer from
    /// the source. Cancellation is caller-driven and never transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::Cancelled => false,
        }
    }
}
