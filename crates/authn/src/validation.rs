//! Token header validation.
//!
//! The verifier pins its accepted algorithm family when it is built and
//! never lets the token choose. These checks run before any key lookup, so a
//! hostile header cannot trigger a key set fetch.
//!
//! # Security
//!
//! - `none` and the HMAC family are always rejected (RFC 8725 §3.1)
//! - Only algorithms in the configured [`AlgorithmPolicy`] are accepted
//! - Key IDs are length- and charset-checked before they reach the cache

use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ConfigError};

/// Algorithm names that are never accepted, whatever the policy says.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: shared-secret algorithms, which would let
///   anyone holding the public key forge tokens
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// The default accepted family: the wallet platform signs with RSA.
pub const DEFAULT_ACCEPTED_ALGORITHMS: &[Algorithm] =
    &[Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Maximum length of a `kid` header value, in bytes.
pub const MAX_KID_LENGTH: usize = 256;

/// The set of signature algorithms a verifier accepts.
///
/// Serialized as a plain list of algorithm names; deserialization goes
/// through [`AlgorithmPolicy::new`], so a config file cannot smuggle in an
/// empty list or an HMAC algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Algorithm>", into = "Vec<Algorithm>")]
pub struct AlgorithmPolicy {
    accepted: Vec<Algorithm>,
}

impl AlgorithmPolicy {
    /// Creates a policy accepting exactly the given algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the list is empty and
    /// [`ConfigError::Invalid`] if it contains an HMAC algorithm.
    pub fn new(algorithms: impl IntoIterator<Item = Algorithm>) -> Result<Self, ConfigError> {
        let mut accepted: Vec<Algorithm> = Vec::new();
        for alg in algorithms {
            if is_symmetric(alg) {
                return Err(ConfigError::invalid(
                    "algorithms",
                    format!("{alg:?} is a shared-secret algorithm"),
                ));
            }
            if !accepted.contains(&alg) {
                accepted.push(alg);
            }
        }

        if accepted.is_empty() {
            return Err(ConfigError::Missing { field: "algorithms" });
        }

        Ok(Self { accepted })
    }

    /// The accepted algorithms, in configuration order.
    #[must_use]
    pub fn accepted(&self) -> &[Algorithm] {
        &self.accepted
    }

    /// Returns `true` if `alg` is accepted.
    #[must_use]
    pub fn allows(&self, alg: Algorithm) -> bool {
        self.accepted.contains(&alg)
    }

    /// Checks a raw `alg` header value against this policy.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] if the algorithm is forbidden,
    /// unknown, or outside the policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use jsonwebtoken::Algorithm;
    /// use setto_authn::validation::AlgorithmPolicy;
    ///
    /// let policy = AlgorithmPolicy::default();
    /// assert_eq!(policy.validate("RS256").unwrap(), Algorithm::RS256);
    /// assert!(policy.validate("none").is_err());
    /// assert!(policy.validate("HS256").is_err());
    /// assert!(policy.validate("ES256").is_err());
    /// ```
    pub fn validate(&self, alg: &str) -> Result<Algorithm, AuthError> {
        if FORBIDDEN_ALGORITHMS.iter().any(|forbidden| forbidden.eq_ignore_ascii_case(alg)) {
            return Err(AuthError::token_invalid(format!(
                "algorithm '{alg}' is not allowed for security reasons"
            )));
        }

        let parsed = Algorithm::from_str(alg).map_err(|e| {
            AuthError::token_invalid_with_source(format!("unknown algorithm '{alg}'"), e)
        })?;

        if !self.allows(parsed) {
            return Err(AuthError::token_invalid(format!(
                "algorithm '{alg}' is not accepted by this verifier"
            )));
        }

        Ok(parsed)
    }
}

impl Default for AlgorithmPolicy {
    fn default() -> Self {
        Self { accepted: DEFAULT_ACCEPTED_ALGORITHMS.to_vec() }
    }
}

impl TryFrom<Vec<Algorithm>> for AlgorithmPolicy {
    type Error = ConfigError;

    fn try_from(algorithms: Vec<Algorithm>) -> Result<Self, Self::Error> {
        Self::new(algorithms)
    }
}

impl From<AlgorithmPolicy> for Vec<Algorithm> {
    fn from(policy: AlgorithmPolicy) -> Self {
        policy.accepted
    }
}

fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Validates a `kid` header value.
///
/// # Errors
///
/// Returns [`AuthError::TokenInvalid`] if the key ID is empty, longer than
/// [`MAX_KID_LENGTH`] bytes, or contains control characters.
pub fn validate_kid(kid: &str) -> Result<(), AuthError> {
    if kid.is_empty() {
        return Err(AuthError::token_invalid("token header has an empty 'kid'"));
    }
    if kid.len() > MAX_KID_LENGTH {
        return Err(AuthError::token_invalid(format!(
            "'kid' is {} bytes, exceeding the maximum of {MAX_KID_LENGTH}",
            kid.len()
        )));
    }
    if kid.chars().any(char::is_control) {
        return Err(AuthError::token_invalid("'kid' contains control characters"));
    }
    Ok(())
}
