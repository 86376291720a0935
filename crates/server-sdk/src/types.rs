//! Request and response payloads of the account-linking endpoints.

use serde::{Deserialize, Serialize};

/// A user's phone verification state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatus {
    /// Whether the user has completed phone verification.
    #[serde(default)]
    pub is_phone_verified: bool,
    /// When verification completed, in Unix milliseconds; 0 if not verified.
    #[serde(default)]
    pub verified_at: i64,
}

/// The wallet user behind a consumed account link token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLinkInfo {
    /// The wallet user ID.
    #[serde(default)]
    pub user_id: String,
    /// The user's email address.
    #[serde(default)]
    pub email: String,
    /// Whether the user has completed phone verification.
    #[serde(default)]
    pub is_phone_verified: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExchangeLinkTokenRequest<'a> {
    pub(crate) link_token: &'a str,
}
