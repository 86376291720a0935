//! Client configuration.
//!
//! [`ClientConfig`] selects the wallet environment and carries the partner
//! API key. Like the verifier config it is built through a validating
//! builder or deserialized and then checked with [`ClientConfig::validate`].

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use setto_authn::ConfigError;

/// Production wallet server.
pub const PRODUCTION_URL: &str = "https://wallet.settopay.com";

/// Development wallet server.
pub const DEVELOPMENT_URL: &str = "https://dev-wallet.settopay.com";

/// Default HTTP request timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Every partner API key starts with this prefix.
pub const API_KEY_PREFIX: &str = "sk_partner.";

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// The wallet environment a client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// The live environment. HTTPS is enforced.
    #[default]
    Production,
    /// The test environment.
    Development,
}

impl Environment {
    /// The wallet server URL for this environment.
    #[must_use]
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_URL,
            Self::Development => DEVELOPMENT_URL,
        }
    }
}

/// Configuration for a [`Client`](crate::Client).
///
/// # Example
///
/// ```
/// use setto_server_sdk::{ClientConfig, Environment};
///
/// let config = ClientConfig::builder()
///     .api_key("sk_partner.abc123")
///     .environment(Environment::Development)
///     .build()?;
/// assert_eq!(config.base_url(), "https://dev-wallet.settopay.com");
/// # Ok::<(), setto_authn::ConfigError>(())
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Partner API key (`sk_partner.…`).
    pub(crate) api_key: String,

    /// Wallet environment.
    #[serde(default)]
    pub(crate) environment: Environment,

    /// Overrides the environment's server URL.
    #[serde(default)]
    pub(crate) base_url: Option<String>,

    /// HTTP request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub(crate) timeout: Duration,
}

#[bon::bon]
impl ClientConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Partner API key, must start with `sk_partner.`.
    ///
    /// # Optional Fields
    ///
    /// * `environment` - Wallet environment (default: Production).
    /// * `base_url` - Server URL override; trailing slashes are trimmed.
    /// * `timeout` - HTTP request timeout (default: 30 seconds).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if [`validate`](Self::validate) fails.
    #[builder]
    pub fn new(
        #[builder(into)] api_key: String,
        #[builder(default)] environment: Environment,
        #[builder(into)] base_url: Option<String>,
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { api_key, environment, base_url, timeout };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - the API key is empty or lacks the `sk_partner.` prefix
    /// - the server URL is not `http://` or `https://`
    /// - the environment is Production and the server URL is not `https://`
    /// - `timeout` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing { field: "api_key" });
        }
        if !self.api_key.starts_with(API_KEY_PREFIX) {
            return Err(ConfigError::invalid(
                "api_key",
                format!("must start with '{API_KEY_PREFIX}'"),
            ));
        }

        let base_url = self.base_url();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::invalid("base_url", "must be an http:// or https:// URL"));
        }
        if self.environment == Environment::Production && !base_url.starts_with("https://") {
            return Err(ConfigError::invalid(
                "base_url",
                format!("HTTPS is required in production (got {base_url})"),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "timeout",
                min: "1ms".to_owned(),
                value: format!("{:?}", self.timeout),
            });
        }
        Ok(())
    }

    /// Returns the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the wallet environment.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the effective server URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(self.environment.base_url()).trim_end_matches('/')
    }

    /// Returns the HTTP request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"sk_partner.[REDACTED]")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url())
            .field("timeout", &self.timeout)
            .finish()
    }
}
