//! Key source abstraction.
//!
//! [`KeySource`] is the seam between the key cache and wherever key set
//! documents come from. Production code fetches over HTTPS with
//! [`HttpKeySource`](crate::HttpKeySource); tests drive the cache with
//! [`MemoryKeySource`], which also counts fetches so refresh behavior can be
//! asserted exactly.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{error::FetchError, key_set::KeySet};

/// Something that can produce the current key set for a JWKS URL.
///
/// Implementations must be safe to call from many tasks at once. A fetch is
/// all-or-nothing: either a complete [`KeySet`] comes back or an error does.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetches the key set published at `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing why no key set could be obtained.
    async fn fetch(&self, url: &str) -> Result<KeySet, FetchError>;
}

/// In-memory key source for tests and embedded use.
///
/// Serves whatever key set was most recently installed, regardless of the
/// requested URL.
#[derive(Debug, Default)]
pub struct MemoryKeySource {
    key_set: RwLock<KeySet>,
    fetches: AtomicU64,
}

impl MemoryKeySource {
    /// Creates a source serving an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source serving the given key set.
    #[must_use]
    pub fn with_key_set(key_set: KeySet) -> Self {
        Self { key_set: RwLock::new(key_set), fetches: AtomicU64::new(0) }
    }

    /// Replaces the served key set, simulating a key rotation.
    pub fn set_key_set(&self, key_set: KeySet) {
        *self.key_set.write() = key_set;
    }

    /// Number of times [`KeySource::fetch`] has been called.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl KeySource for MemoryKeySource {
    async fn fetch(&self, _url: &str) -> Result<KeySet, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.key_set.read().clone())
    }
}
