//! # Setto Server SDK
//!
//! Partner server integration with the Setto wallet.
//!
//! This crate provides:
//! - **Client**: authenticated calls to the wallet's integration API
//! - **Identity tokens**: a shared [`TokenVerifier`] bound to the client's
//!   wallet server, with a throttled key cache
//!
//! ## Example
//!
//! ```no_run
//! use setto_server_sdk::{AuthError, Client, ClientConfig, Environment};
//!
//! # async fn example(id_token: &str, link_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(
//!     ClientConfig::builder()
//!         .api_key("sk_partner.abc123")
//!         .environment(Environment::Development)
//!         .build()?,
//! )?;
//!
//! match client.verifier()?.verify_id_token_require_email(id_token).await {
//!     Ok(claims) => println!("signed in as {}", claims.email()),
//!     Err(AuthError::EmailNotVerified) => println!("ask the user to verify their email"),
//!     Err(e) => return Err(e.into()),
//! }
//!
//! let linked = client.exchange_account_link_token(link_token).await?;
//! println!("linked wallet user {}", linked.user_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Wallet API client.
pub mod client;
/// Client configuration.
pub mod config;
/// SDK error types.
pub mod error;
/// Request and response payloads.
pub mod types;

pub use client::{API_KEY_HEADER, Client, JWKS_PATH, SDK_USER_AGENT};
pub use config::{
    API_KEY_PREFIX, ClientConfig, DEFAULT_TIMEOUT, DEVELOPMENT_URL, Environment, PRODUCTION_URL,
};
pub use error::{Result, SdkError, WalletError, codes};
pub use setto_authn::{AuthError, Claims, TokenVerifier};
pub use types::{AccountLinkInfo, VerificationStatus};
