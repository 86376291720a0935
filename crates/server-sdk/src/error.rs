//! SDK error types.
//!
//! The wallet server reports failures through three code fields
//! (`system_error`, `payment_error`, `validation_error`), each `*_OK` when
//! unset. [`WalletError`] keeps all three plus the first non-OK one as its
//! [`code`](WalletError::code), described by its [`message`](WalletError::message).

use serde::Deserialize;
use setto_authn::ConfigError;
use thiserror::Error;

/// Wallet server error codes.
pub mod codes {
    /// No system error.
    pub const SYSTEM_OK: &str = "SYSTEM_OK";
    /// Unexpected server failure.
    pub const SYSTEM_INTERNAL: &str = "SYSTEM_INTERNAL";
    /// An upstream call inside the wallet failed.
    pub const SYSTEM_RPC_FAILED: &str = "SYSTEM_RPC_FAILED";
    /// Too many requests for this API key.
    pub const SYSTEM_RATE_LIMITED: &str = "SYSTEM_RATE_LIMITED";

    /// No payment error.
    pub const PAYMENT_OK: &str = "PAYMENT_OK";
    /// No such payment.
    pub const PAYMENT_NOT_FOUND: &str = "PAYMENT_NOT_FOUND";
    /// No such merchant.
    pub const PAYMENT_MERCHANT_NOT_FOUND: &str = "PAYMENT_MERCHANT_NOT_FOUND";
    /// The one-time token is missing.
    pub const PAYMENT_OTT_REQUIRED: &str = "PAYMENT_OTT_REQUIRED";
    /// The one-time token is not recognized.
    pub const PAYMENT_OTT_INVALID: &str = "PAYMENT_OTT_INVALID";
    /// The one-time token has expired.
    pub const PAYMENT_OTT_EXPIRED: &str = "PAYMENT_OTT_EXPIRED";
    /// The one-time token was already consumed.
    pub const PAYMENT_OTT_ALREADY_USED: &str = "PAYMENT_OTT_ALREADY_USED";
    /// The one-time token was issued for another scope.
    pub const PAYMENT_OTT_SCOPE_MISMATCH: &str = "PAYMENT_OTT_SCOPE_MISMATCH";

    /// No validation error.
    pub const VALIDATION_OK: &str = "VALIDATION_OK";
    /// A required field is missing.
    pub const VALIDATION_REQUIRED_FIELD: &str = "VALIDATION_REQUIRED_FIELD";
    /// A field is malformed.
    pub const VALIDATION_INVALID_FORMAT: &str = "VALIDATION_INVALID_FORMAT";
    /// An ID is malformed or unknown.
    pub const VALIDATION_INVALID_ID: &str = "VALIDATION_INVALID_ID";
    /// The request as a whole is invalid.
    pub const VALIDATION_INVALID_REQUEST: &str = "VALIDATION_INVALID_REQUEST";
}

/// The three error code fields the wallet server embeds in its bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct ErrorFields {
    #[serde(default)]
    system_error: String,
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    validation_error: String,
}

impl ErrorFields {
    /// The first code that is set and not its family's `*_OK` value, with
    /// the family's name.
    pub(crate) fn first_error(&self) -> Option<(&'static str, &str)> {
        [
            ("system", self.system_error.as_str(), codes::SYSTEM_OK),
            ("payment", self.payment_error.as_str(), codes::PAYMENT_OK),
            ("validation", self.validation_error.as_str(), codes::VALIDATION_OK),
        ]
        .into_iter()
        .find(|(_, code, ok)| !code.is_empty() && code != ok)
        .map(|(family, code, _)| (family, code))
    }
}

/// A structured error reported by the wallet server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Wallet server error (HTTP {http_status}){}", describe_code(.code))]
pub struct WalletError {
    fields: ErrorFields,
    code: String,
    message: String,
    http_status: u16,
}

fn describe_code(code: &str) -> String {
    if code.is_empty() { String::new() } else { format!(": {code}") }
}

impl WalletError {
    /// Builds an error from a response status and body.
    ///
    /// A body that is not a JSON error object still yields an error, with an
    /// empty code.
    #[must_use]
    pub(crate) fn from_response(http_status: u16, body: &[u8]) -> Self {
        let fields: ErrorFields = serde_json::from_slice(body).unwrap_or_default();
        Self::from_fields(http_status, fields)
    }

    pub(crate) fn from_fields(http_status: u16, fields: ErrorFields) -> Self {
        let (code, message) = match fields.first_error() {
            Some((family, code)) => (code.to_owned(), format!("{family} error: {code}")),
            None => (String::new(), String::new()),
        };
        Self { fields, code, message, http_status }
    }

    /// The first non-OK code among the system, payment and validation codes,
    /// or empty if the server sent none.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Which code family failed and its code, e.g. `payment error: PAYMENT_NOT_FOUND`.
    ///
    /// Empty when [`code`](Self::code) is.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status of the response.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    /// The raw `system_error` field.
    #[must_use]
    pub fn system_error(&self) -> &str {
        &self.fields.system_error
    }

    /// The raw `payment_error` field.
    #[must_use]
    pub fn payment_error(&self) -> &str {
        &self.fields.payment_error
    }

    /// The raw `validation_error` field.
    #[must_use]
    pub fn validation_error(&self) -> &str {
        &self.fields.validation_error
    }

    /// Returns `true` for rate limiting and server-side failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.http_status == 429
            || self.http_status >= 500
            || self.code == codes::SYSTEM_RATE_LIMITED
            || self.code == codes::SYSTEM_RPC_FAILED
    }
}

/// Result type alias for SDK calls.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors returned by [`Client`](crate::Client) calls.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SdkError {
    /// The client or verifier configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The request could not be sent or the response could not be read.
    #[error("Network error: {message}")]
    Network {
        /// What failed.
        message: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The wallet server rejected the request.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// A successful response body did not match the expected shape.
    #[error("Failed to decode response: {message}")]
    Decode {
        /// What failed to decode.
        message: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl SdkError {
    /// Creates a `Network` error from an HTTP client error.
    #[must_use]
    pub fn network(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network { message: message.into(), source }
    }

    /// Creates a `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode { message: message.into(), source }
    }

    /// Returns the wallet error, if the server rejected the request.
    #[must_use]
    pub fn as_wallet_error(&self) -> Option<&WalletError> {
        match self {
            Self::Wallet(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if retrying the call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Wallet(e) => e.is_transient(),
            Self::Config(_) | Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::system_first(
        r#"{"system_error":"SYSTEM_INTERNAL","payment_error":"PAYMENT_NOT_FOUND"}"#,
        "SYSTEM_INTERNAL"
    )]
    #[case::ok_system_skipped(
        r#"{"system_error":"SYSTEM_OK","payment_error":"PAYMENT_OTT_EXPIRED"}"#,
        "PAYMENT_OTT_EXPIRED"
    )]
    #[case::validation_last(
        r#"{"system_error":"SYSTEM_OK","payment_error":"PAYMENT_OK","validation_error":"VALIDATION_INVALID_ID"}"#,
        "VALIDATION_INVALID_ID"
    )]
    #[case::all_ok(r#"{"system_error":"SYSTEM_OK","payment_error":"PAYMENT_OK"}"#, "")]
    #[case::not_json("upstream connect error", "")]
    #[case::empty("", "")]
    fn test_code_selection(#[case] body: &str, #[case] expected: &str) {
        let err = WalletError::from_response(400, body.as_bytes());
        assert_eq!(err.code(), expected);
        assert_eq!(err.http_status(), 400);
    }

    #[rstest]
    #[case::system(r#"{"system_error":"SYSTEM_RPC_FAILED"}"#, "system error: SYSTEM_RPC_FAILED")]
    #[case::payment(
        r#"{"system_error":"SYSTEM_OK","payment_error":"PAYMENT_OTT_INVALID"}"#,
        "payment error: PAYMENT_OTT_INVALID"
    )]
    #[case::validation(
        r#"{"validation_error":"VALIDATION_REQUIRED_FIELD"}"#,
        "validation error: VALIDATION_REQUIRED_FIELD"
    )]
    #[case::none(r#"{"system_error":"SYSTEM_OK"}"#, "")]
    fn test_message_names_failing_family(#[case] body: &str, #[case] expected: &str) {
        let err = WalletError::from_response(400, body.as_bytes());
        assert_eq!(err.message(), expected);
    }

    #[test]
    fn test_raw_fields_preserved() {
        let err = WalletError::from_response(
            404,
            br#"{"system_error":"SYSTEM_OK","payment_error":"PAYMENT_NOT_FOUND","extra":1}"#,
        );
        assert_eq!(err.system_error(), codes::SYSTEM_OK);
        assert_eq!(err.payment_error(), codes::PAYMENT_NOT_FOUND);
        assert_eq!(err.validation_error(), "");
    }

    #[test]
    fn test_display() {
        let coded = WalletError::from_response(404, br#"{"payment_error":"PAYMENT_NOT_FOUND"}"#);
        assert_eq!(coded.to_string(), "Wallet server error (HTTP 404): PAYMENT_NOT_FOUND");

        let bare = WalletError::from_response(502, b"");
        assert_eq!(bare.to_string(), "Wallet server error (HTTP 502)");
    }

    #[rstest]
    #[case::rate_limited_status(429, "", true)]
    #[case::server_error(503, "", true)]
    #[case::rate_limited_code(400, r#"{"system_error":"SYSTEM_RATE_LIMITED"}"#, true)]
    #[case::not_found(404, r#"{"payment_error":"PAYMENT_NOT_FOUND"}"#, false)]
    #[case::unauthorized(401, "", false)]
    fn test_wallet_error_transience(#[case] status: u16, #[case] body: &str, #[case] transient: bool) {
        let err = SdkError::from(WalletError::from_response(status, body.as_bytes()));
        assert_eq!(err.is_transient(), transient);
    }

    #[test]
    fn test_config_error_converts() {
        let err = SdkError::from(ConfigError::Missing { field: "api_key" });
        assert!(matches!(err, SdkError::Config(ConfigError::Missing { field: "api_key" })));
        assert!(!err.is_transient());
        assert!(err.as_wallet_error().is_none());
    }
}
