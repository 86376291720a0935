//! Authenticated wallet API client.

use std::sync::{Arc, OnceLock};

use reqwest::{
    Method, Url,
    header::{ACCEPT, CONTENT_TYPE, USER_AGENT},
};
use serde::{Serialize, de::DeserializeOwned};
use setto_authn::{ConfigError, TokenVerifier, VerifierConfig};

use crate::{
    config::ClientConfig,
    error::{ErrorFields, Result, SdkError, WalletError},
    types::{AccountLinkInfo, ExchangeLinkTokenRequest, VerificationStatus},
};

/// Header carrying the partner API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// `User-Agent` sent with every request.
pub const SDK_USER_AGENT: &str = concat!("setto-server-sdk-rust/", env!("CARGO_PKG_VERSION"));

/// Path of the key set document under the server URL.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Setto wallet API client for partner servers.
///
/// Cheap to share behind an `Arc`; the underlying HTTP connection pool and
/// the token verifier are shared by all calls.
///
/// # Example
///
/// ```no_run
/// use setto_server_sdk::{Client, ClientConfig};
///
/// # async fn example(id_token: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new(ClientConfig::builder().api_key("sk_partner.abc123").build()?)?;
///
/// let claims = client.verifier()?.verify_id_token(id_token).await?;
/// let status = client.get_verification_status(claims.user_id()).await?;
/// println!("phone verified: {}", status.is_phone_verified);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
    verifier: OnceLock<Arc<TokenVerifier>>,
}

impl Client {
    /// Creates a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if the configuration is invalid and
    /// [`SdkError::Network`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SdkError::network("failed to build HTTP client", e))?;
        Self::with_http_client(config, http)
    }

    /// Creates a client over a caller-supplied HTTP client.
    ///
    /// The configured timeout is not applied to `http`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if the configuration is invalid.
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, http, verifier: OnceLock::new() })
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the server URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Returns the key set URL identity tokens are verified against.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.base_url())
    }

    /// Returns the identity token verifier for this client's server.
    ///
    /// Built on first use and shared afterwards, so every caller benefits
    /// from the same key cache. Issuer is the server URL.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if the verifier cannot be built.
    pub fn verifier(&self) -> Result<Arc<TokenVerifier>> {
        if let Some(verifier) = self.verifier.get() {
            return Ok(Arc::clone(verifier));
        }

        let config = VerifierConfig::builder().jwks_url(self.jwks_url()).issuer(self.base_url()).build()?;
        let built = Arc::new(TokenVerifier::from_config(config)?);
        // A racing caller may have won; everyone gets the published one.
        Ok(Arc::clone(self.verifier.get_or_init(|| built)))
    }

    /// Checks whether a user has completed phone verification.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Wallet`] if the server rejects the request,
    /// [`SdkError::Network`] on transport failures and [`SdkError::Decode`]
    /// on an unexpected response body.
    pub async fn get_verification_status(&self, user_id: &str) -> Result<VerificationStatus> {
        let url = self.endpoint(&["api", "integration", "user", user_id, "verification"])?;
        self.send(Method::GET, url, None::<&()>).await
    }

    /// Exchanges a one-time account link token for the linked user's details.
    ///
    /// The server consumes the token atomically; a second exchange fails.
    ///
    /// # Errors
    ///
    /// See [`get_verification_status`](Self::get_verification_status).
    pub async fn exchange_account_link_token(&self, link_token: &str) -> Result<AccountLinkInfo> {
        let url = self.endpoint(&["api", "integration", "exchange-link-token"])?;
        self.send(Method::POST, url, Some(&ExchangeLinkTokenRequest { link_token })).await
    }

    /// Joins path segments onto the server URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(self.base_url())
            .map_err(|e| ConfigError::invalid("base_url", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ConfigError::invalid("base_url", "cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    #[tracing::instrument(skip(self, method, url, body), fields(method = %method, path = url.path()))]
    async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let mut request = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, self.config.api_key())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, SDK_USER_AGENT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| SdkError::network("request failed", e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SdkError::network("failed to read response body", e))?;

        if !status.is_success() {
            let err = WalletError::from_response(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), code = err.code(), "wallet request rejected");
            return Err(err.into());
        }

        // Success statuses can still carry an embedded error code.
        if let Ok(fields) = serde_json::from_slice::<ErrorFields>(&body)
            && fields.first_error().is_some()
        {
            let err = WalletError::from_fields(status.as_u16(), fields);
            tracing::warn!(status = status.as_u16(), code = err.code(), "wallet request rejected");
            return Err(err.into());
        }

        if body.is_empty() {
            return Ok(T::default());
        }
        let decoded = serde_json::from_slice(&body)
            .map_err(|e| SdkError::decode("response body does not match the expected shape", e))?;
        tracing::debug!(status = status.as_u16(), "wallet request succeeded");
        Ok(decoded)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("verifier_built", &self.verifier.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn client(base_url: &str) -> Client {
        let config = ClientConfig::builder()
            .api_key("sk_partner.unit")
            .environment(Environment::Development)
            .base_url(base_url)
            .build()
            .unwrap();
        Client::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_endpoint_encodes_segments() {
        let client = client("https://wallet.example");

        let url = client.endpoint(&["api", "integration", "user", "a b/c", "verification"]).unwrap();

        assert_eq!(url.as_str(), "https://wallet.example/api/integration/user/a%20b%2Fc/verification");
    }

    #[tokio::test]
    async fn test_endpoint_keeps_base_path() {
        let client = client("https://gateway.example/wallet/");

        let url = client.endpoint(&["api", "integration", "exchange-link-token"]).unwrap();

        assert_eq!(url.as_str(), "https://gateway.example/wallet/api/integration/exchange-link-token");
    }

    #[tokio::test]
    async fn test_verifier_bound_to_base_url_and_shared() {
        let client = client("https://wallet.example/");

        let first = client.verifier().unwrap();
        let second = client.verifier().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.issuer(), "https://wallet.example");
        assert_eq!(first.key_cache().jwks_url(), "https://wallet.example/.well-known/jwks.json");
        assert!(!first.key_cache().is_initialized());
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert_eq!(SDK_USER_AGENT, format!("setto-server-sdk-rust/{}", env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn test_debug_hides_api_key() {
        let config = ClientConfig::builder()
            .api_key("sk_partner.very-secret")
            .build()
            .unwrap();
        let client = Client::with_http_client(config, reqwest::Client::new()).unwrap();
        assert!(!format!("{client:?}").contains("very-secret"));
    }
}
