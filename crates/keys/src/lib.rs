//! # Setto Keys - key set model and sources
//!
//! This crate holds the pieces of identity token verification that deal with
//! *where keys come from*, independent of how tokens are checked:
//!
//! - [`KeySet`] / [`SigningKey`]: a parsed JWKS document, usable entries only
//! - [`KeySource`]: the async fetch seam used by the key cache
//! - [`HttpKeySource`]: production fetcher over HTTPS
//! - [`MemoryKeySource`]: in-memory source with a fetch counter for tests
//! - [`FetchError`]: why a fetch failed (transport, status, parse, timeout, cancel)
//!
//! ## Example
//!
//! ```no_run
//! use setto_keys::{HttpKeySource, KeySource};
//!
//! # async fn example() -> Result<(), setto_keys::FetchError> {
//! let source = HttpKeySource::new()?;
//! let keys = source.fetch("https://wallet.settopay.com/.well-known/jwks.json").await?;
//! println!("{} signing keys published", keys.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod key_set;
pub mod source;

pub use error::{BoxError, FetchError};
pub use http::HttpKeySource;
pub use key_set::{KeySet, SigningKey};
pub use source::{KeySource, MemoryKeySource};
