//! Verifier configuration.
//!
//! [`VerifierConfig`] is built through a validating builder or deserialized
//! from a config file; both paths end in [`VerifierConfig::validate`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, validation::AlgorithmPolicy};

/// Default minimum interval between miss-triggered key set refetches (15 minutes).
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default age after which a cached key set is refreshed even on a hit (24 hours).
pub const DEFAULT_MAX_KEY_SET_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time budget for a single key set fetch (10 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default clock leeway for `exp` and `nbf` checks.
pub const DEFAULT_LEEWAY: Duration = Duration::ZERO;

/// Smallest accepted fetch timeout.
const MIN_FETCH_TIMEOUT: Duration = Duration::from_millis(1);

fn default_algorithms() -> AlgorithmPolicy {
    AlgorithmPolicy::default()
}

fn default_min_refresh_interval() -> Duration {
    DEFAULT_MIN_REFRESH_INTERVAL
}

fn default_max_key_set_age() -> Duration {
    DEFAULT_MAX_KEY_SET_AGE
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_leeway() -> Duration {
    DEFAULT_LEEWAY
}

/// Configuration for a [`TokenVerifier`](crate::TokenVerifier) and its key cache.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use setto_authn::VerifierConfig;
///
/// let config = VerifierConfig::builder()
///     .jwks_url("https://wallet.settopay.com/.well-known/jwks.json")
///     .issuer("https://wallet.settopay.com")
///     .leeway(Duration::from_secs(30))
///     .build()?;
/// assert_eq!(config.min_refresh_interval(), Duration::from_secs(900));
/// # Ok::<(), setto_authn::ConfigError>(())
/// ```
///
/// Deserialized configs use human-readable durations:
///
/// ```toml
/// jwks_url = "https://wallet.settopay.com/.well-known/jwks.json"
/// issuer = "https://wallet.settopay.com"
/// min_refresh_interval = "15m"
/// fetch_timeout = "5s"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// Where the key set document is published.
    pub(crate) jwks_url: String,

    /// The exact `iss` value tokens must carry.
    pub(crate) issuer: String,

    /// Accepted signature algorithms.
    #[serde(default = "default_algorithms")]
    pub(crate) algorithms: AlgorithmPolicy,

    /// Minimum interval between refetches triggered by an unknown key ID.
    #[serde(with = "humantime_serde", default = "default_min_refresh_interval")]
    pub(crate) min_refresh_interval: Duration,

    /// Age after which a cached key set is refreshed on the next hit.
    #[serde(with = "humantime_serde", default = "default_max_key_set_age")]
    pub(crate) max_key_set_age: Duration,

    /// Time budget for a single key set fetch.
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub(crate) fetch_timeout: Duration,

    /// Clock skew tolerated on `exp` and `nbf`.
    #[serde(with = "humantime_serde", default = "default_leeway")]
    pub(crate) leeway: Duration,
}

#[bon::bon]
impl VerifierConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - Key set document URL (`http://` or `https://`).
    /// * `issuer` - Expected `iss` claim, compared exactly.
    ///
    /// # Optional Fields
    ///
    /// * `algorithms` - Accepted algorithms (default: RS256, RS384, RS512).
    /// * `min_refresh_interval` - Refetch throttle (default: 15 minutes).
    /// * `max_key_set_age` - Staleness bound (default: 24 hours).
    /// * `fetch_timeout` - Per-fetch budget (default: 10 seconds).
    /// * `leeway` - Clock skew tolerance (default: none).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if [`validate`](Self::validate) fails.
    #[builder]
    pub fn new(
        #[builder(into)] jwks_url: String,
        #[builder(into)] issuer: String,
        #[builder(default)] algorithms: AlgorithmPolicy,
        #[builder(default = DEFAULT_MIN_REFRESH_INTERVAL)] min_refresh_interval: Duration,
        #[builder(default = DEFAULT_MAX_KEY_SET_AGE)] max_key_set_age: Duration,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] fetch_timeout: Duration,
        #[builder(default = DEFAULT_LEEWAY)] leeway: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            jwks_url,
            issuer,
            algorithms,
            min_refresh_interval,
            max_key_set_age,
            fetch_timeout,
            leeway,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// Call this after deserializing a config from an untrusted source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `jwks_url` or `issuer` is empty
    /// - `jwks_url` is not an `http://` or `https://` URL
    /// - `fetch_timeout` is zero
    /// - `max_key_set_age` is shorter than `min_refresh_interval`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwks_url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "jwks_url" });
        }
        if !(self.jwks_url.starts_with("https://") || self.jwks_url.starts_with("http://")) {
            return Err(ConfigError::invalid("jwks_url", "must be an http:// or https:// URL"));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Missing { field: "issuer" });
        }
        if self.fetch_timeout < MIN_FETCH_TIMEOUT {
            return Err(ConfigError::BelowMinimum {
                field: "fetch_timeout",
                min: format!("{MIN_FETCH_TIMEOUT:?}"),
                value: format!("{:?}", self.fetch_timeout),
            });
        }
        if self.max_key_set_age < self.min_refresh_interval {
            return Err(ConfigError::BelowMinimum {
                field: "max_key_set_age",
                min: format!("{:?}", self.min_refresh_interval),
                value: format!("{:?}", self.max_key_set_age),
            });
        }
        Ok(())
    }

    /// Returns the key set document URL.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Returns the expected issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the accepted algorithm policy.
    #[must_use]
    pub fn algorithms(&self) -> &AlgorithmPolicy {
        &self.algorithms
    }

    /// Returns the minimum refetch interval.
    #[must_use]
    pub fn min_refresh_interval(&self) -> Duration {
        self.min_refresh_interval
    }

    /// Returns the staleness bound.
    #[must_use]
    pub fn max_key_set_age(&self) -> Duration {
        self.max_key_set_age
    }

    /// Returns the per-fetch time budget.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Returns the clock leeway.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }
}
