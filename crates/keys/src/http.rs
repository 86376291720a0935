//! HTTP key source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;

use crate::{error::FetchError, key_set::KeySet, source::KeySource};

/// Default per-request timeout for key set fetches.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout for key set fetches.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches key set documents over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    client: reqwest::Client,
}

impl HttpKeySource {
    /// Creates a source with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built
    /// (for example when no TLS backend can be initialized).
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a source with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!("setto-keys/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::transport_with_source("failed to build HTTP client", e))?;
        Ok(Self { client })
    }

    /// Wraps an existing client, sharing its connection pool.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<KeySet, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                let message =
                    if e.is_timeout() { "key set request timed out" } else { "key set request failed" };
                FetchError::transport_with_source(message, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Key set endpoint returned an error status");
            return Err(FetchError::status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport_with_source("failed to read key set body", e))?;

        let key_set = KeySet::from_json(&body)?;
        tracing::debug!(key_count = key_set.len(), "Fetched key set");
        Ok(key_set)
    }
}
