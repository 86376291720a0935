//! Parsed key set documents.
//!
//! A [`KeySet`] is the verifier-side view of a JWKS document: the subset of
//! published keys that can verify asymmetric signatures, indexed by key-id.
//! Entries that cannot be used (no `kid`, symmetric material, encryption-only
//! keys, unsupported parameters) are skipped with a warning rather than
//! failing the whole document, so one malformed key never takes the others
//! down with it.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    str::FromStr,
    sync::Arc,
};

use jsonwebtoken::{Algorithm, DecodingKey, jwk::Jwk};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;

/// A single verification key taken from a key set document.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key_type: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Builds a verification key from one JWK object.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Parse`] when the entry has no `kid`, holds
    /// symmetric (`oct`) material, is marked for encryption (`"use": "enc"`),
    /// declares an HMAC or unknown `alg`, or carries key parameters that
    /// `jsonwebtoken` cannot turn into a decoding key.
    pub fn from_jwk_value(value: &Value) -> Result<Self, FetchError> {
        let kid = value
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| FetchError::parse("JWK entry has no 'kid'"))?
            .to_owned();

        let key_type = value
            .get("kty")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::parse(format!("JWK '{kid}' has no 'kty'")))?
            .to_owned();

        if key_type == "oct" {
            return Err(FetchError::parse(format!("JWK '{kid}' holds symmetric key material")));
        }

        if value.get("use").and_then(Value::as_str) == Some("enc") {
            return Err(FetchError::parse(format!("JWK '{kid}' is an encryption key")));
        }

        let algorithm = match value.get("alg").and_then(Value::as_str) {
            Some(alg) => {
                let parsed = Algorithm::from_str(alg).map_err(|e| {
                    FetchError::parse_with_source(
                        format!("JWK '{kid}' declares unsupported alg '{alg}'"),
                        e,
                    )
                })?;
                if matches!(parsed, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
                    return Err(FetchError::parse(format!(
                        "JWK '{kid}' declares symmetric alg '{alg}'"
                    )));
                }
                Some(parsed)
            },
            None => None,
        };

        let jwk: Jwk = serde_json::from_value(value.clone()).map_err(|e| {
            FetchError::parse_with_source(format!("JWK '{kid}' has malformed parameters"), e)
        })?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            FetchError::parse_with_source(format!("JWK '{kid}' is not a usable public key"), e)
        })?;

        Ok(Self { kid, key_type, algorithm, decoding_key })
    }

    /// Builds a verification key directly from a decoding key.
    ///
    /// Used by in-process key sources that never go through JSON.
    #[must_use]
    pub fn from_decoding_key(
        kid: impl Into<String>,
        key_type: impl Into<String>,
        algorithm: Option<Algorithm>,
        decoding_key: DecodingKey,
    ) -> Self {
        Self { kid: kid.into(), key_type: key_type.into(), algorithm, decoding_key }
    }

    /// The key-id this key is published under.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The JWK key type (`RSA`, `EC`, `OKP`).
    #[must_use]
    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    /// The algorithm the key is pinned to, if the JWK declared one.
    #[must_use]
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// The key material for signature verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct KeySetDocument {
    keys: Vec<Value>,
}

/// An immutable collection of verification keys, unique by key-id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    /// Publication order.
    keys: Vec<Arc<SigningKey>>,
    by_kid: HashMap<String, Arc<SigningKey>>,
}

impl KeySet {
    /// Creates a key set from already-built keys.
    ///
    /// When two keys share a key-id, the first one wins.
    pub fn new(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        let mut ordered = Vec::new();
        let mut by_kid = HashMap::new();
        for key in keys {
            match by_kid.entry(key.kid.clone()) {
                Entry::Vacant(slot) => {
                    let key = Arc::new(key);
                    slot.insert(Arc::clone(&key));
                    ordered.push(key);
                },
                Entry::Occupied(_) => {
                    tracing::warn!(kid = %key.kid, "Duplicate key-id in key set, keeping the first");
                },
            }
        }
        Self { keys: ordered, by_kid }
    }

    /// Parses a JWKS document (`{"keys": [...]}`).
    ///
    /// Unusable entries are skipped with a warning. A document whose every
    /// entry is unusable yields an empty key set, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Parse`] if the body is not JSON or has no
    /// `keys` array.
    pub fn from_json(body: &[u8]) -> Result<Self, FetchError> {
        let document: KeySetDocument = serde_json::from_slice(body)
            .map_err(|e| FetchError::parse_with_source("invalid key set document", e))?;

        let keys = document.keys.iter().filter_map(|value| match SigningKey::from_jwk_value(value) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unusable key set entry");
                None
            },
        });

        Ok(Self::new(keys))
    }

    /// Looks up a key by key-id.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.by_kid.get(kid).cloned()
    }

    /// Iterates over the key-ids in publication order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.kid.as_str())
    }

    /// Iterates over the keys in publication order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SigningKey>> {
        self.keys.iter()
    }

    /// Number of usable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set holds no usable keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
