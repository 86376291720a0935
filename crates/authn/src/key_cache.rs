//! Throttled key set cache for identity token verification.
//!
//! This module provides [`KeyCache`], which holds the most recently fetched
//! [`KeySet`] for one key source URL and answers key-id lookups without a
//! network round-trip on the hot path.
//!
//! # Architecture
//!
//! ```text
//! lookup(kid) → first use? register source (once, no I/O)
//!             → no snapshot → populate (throttled, serialized) → re-check
//!             → snapshot has kid and is fresh → hit
//!             → snapshot has kid but is stale → refresh, fall back to the stale key on failure
//!             → kid unknown → miss-triggered refresh (throttled) → re-check
//! ```
//!
//! # Cache Strategy
//!
//! - **Snapshot**: one immutable [`KeySet`] at a time, swapped atomically with
//!   `arc-swap`. Readers never block on a refresh and never see a partial set.
//! - **Throttle**: a refresh triggered by a miss (an unknown key ID, or no
//!   snapshot yet) happens at most once per `min_refresh_interval`, whether
//!   it succeeds or fails. Further misses in that window answer "not found"
//!   immediately, so a flood of forged key IDs costs one fetch. Only a
//!   caller-cancelled attempt gives its window back.
//! - **First population**: serialized, so concurrent first lookups share one
//!   fetch. Lookups against a published snapshot never wait on it.
//! - **Staleness**: a snapshot older than `max_key_set_age` is refreshed on the
//!   next hit. If that refresh fails the stale key is still served.
//! - **Ordering**: every refresh takes a generation number up front; a slow
//!   refresh never overwrites a snapshot published by a newer one.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use setto_authn::{KeyCache, VerifierConfig};
//! use setto_keys::HttpKeySource;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig::builder()
//!     .jwks_url("https://wallet.settopay.com/.well-known/jwks.json")
//!     .issuer("https://wallet.settopay.com")
//!     .build()?;
//! let cache = KeyCache::new(Arc::new(HttpKeySource::new()?), &config);
//!
//! if let Some(key) = cache.lookup("wallet-2026-01", &CancellationToken::new()).await? {
//!     println!("found {}", key.kid());
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use fail::fail_point;
use parking_lot::Mutex;
use setto_keys::{FetchError, KeySet, KeySource, SigningKey};
use tokio::{sync::Mutex as AsyncMutex, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::config::VerifierConfig;

/// One published key set snapshot.
#[derive(Debug)]
struct CacheEntry {
    key_set: KeySet,
    fetched_at: Instant,
    generation: u64,
}

/// Permission to run one throttled refresh, released only if the caller cancels it.
#[derive(Debug, Clone, Copy)]
struct RefreshClaim {
    previous: u64,
    claimed: u64,
}

/// Lazily created per-source state.
#[derive(Debug)]
struct CacheState {
    snapshot: ArcSwapOption<CacheEntry>,
    /// Monotonic generation counter; each refresh takes the next value.
    next_generation: AtomicU64,
    /// Milliseconds after `epoch` (plus one) of the last throttled refresh; 0 = never.
    last_refresh_claim: AtomicU64,
    epoch: Instant,
    /// Held while the first snapshot is being fetched.
    population: AsyncMutex<()>,
    /// Error of the most recent failed fetch, cleared by the next success.
    last_error: Mutex<Option<FetchError>>,
}

impl CacheState {
    fn new() -> Self {
        Self {
            snapshot: ArcSwapOption::empty(),
            next_generation: AtomicU64::new(0),
            last_refresh_claim: AtomicU64::new(0),
            epoch: Instant::now(),
            population: AsyncMutex::new(()),
            last_error: Mutex::new(None),
        }
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX).saturating_add(1)
    }

    /// Claims the throttled refresh slot unless one was claimed within `interval`.
    ///
    /// Only one of several concurrent callers can win the same slot.
    fn try_claim_refresh(&self, interval: Duration) -> Option<RefreshClaim> {
        let now = self.now_millis();
        let previous = self.last_refresh_claim.load(Ordering::Acquire);
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);

        if previous != 0 && now.saturating_sub(previous) < interval_ms {
            return None;
        }

        self.last_refresh_claim
            .compare_exchange(previous, now, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshClaim { previous, claimed: now })
    }

    /// Gives a cancelled refresh's slot back so the next miss can retry.
    fn release_refresh(&self, claim: RefreshClaim) {
        let _ = self.last_refresh_claim.compare_exchange(
            claim.claimed,
            claim.previous,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a fresh snapshot.
    pub hits: u64,
    /// Lookups whose key ID was absent (or that found no snapshot yet).
    pub misses: u64,
    /// Misses answered without a fetch because of the throttle.
    pub throttled: u64,
    /// Successful key set fetches.
    pub refreshes: u64,
    /// Failed, timed-out or cancelled key set fetches.
    pub refresh_errors: u64,
    /// Lookups answered from a stale snapshot.
    pub stale_served: u64,
}

/// Key set cache for a single key source URL.
///
/// Shared between tasks via `Arc`. Creating a cache performs no I/O; the
/// source is registered on first use and fetched on the first lookup.
pub struct KeyCache {
    jwks_url: String,
    source: Arc<dyn KeySource>,
    min_refresh_interval: Duration,
    max_key_set_age: Duration,
    fetch_timeout: Duration,
    state: OnceLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    throttled: AtomicU64,
    refreshes: AtomicU64,
    refresh_errors: AtomicU64,
    stale_served: AtomicU64,
    /// Cancels in-flight refreshes and the background refresh task.
    cancel_token: CancellationToken,
    /// Wrapped in `Mutex` so `shutdown()` can take ownership via `&self`.
    refresh_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl KeyCache {
    /// Creates a cache for `config.jwks_url()` backed by `source`.
    #[must_use]
    pub fn new(source: Arc<dyn KeySource>, config: &VerifierConfig) -> Self {
        Self {
            jwks_url: config.jwks_url().to_owned(),
            source,
            min_refresh_interval: config.min_refresh_interval(),
            max_key_set_age: config.max_key_set_age(),
            fetch_timeout: config.fetch_timeout(),
            state: OnceLock::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            refresh_errors: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        }
    }

    /// Registers the key source and refresh policy.
    ///
    /// Idempotent and safe to race: exactly one caller performs the
    /// registration, the rest observe it. No network I/O happens here.
    pub fn initialize(&self) {
        let _ = self.state();
    }

    /// Returns `true` once [`initialize`](Self::initialize) (or a lookup) has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    fn state(&self) -> &CacheState {
        self.state.get_or_init(|| {
            tracing::info!(
                url = %self.jwks_url,
                min_refresh_interval = ?self.min_refresh_interval,
                max_key_set_age = ?self.max_key_set_age,
                "Registered key set source"
            );
            CacheState::new()
        })
    }

    /// Resolves a key ID to a verification key.
    ///
    /// Returns `Ok(None)` when the key ID is unknown after the (possibly
    /// throttled) refresh, and `Err` when the key set could not be fetched.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of a failed refresh. A failed refresh
    /// leaves the previous snapshot in place. With no snapshot at all, a
    /// throttled lookup returns the error of the last failed fetch.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn lookup(
        &self,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<SigningKey>>, FetchError> {
        let state = self.state();

        let Some(entry) = state.snapshot.load_full() else {
            return self.populate(state, kid, cancel).await;
        };

        if let Some(key) = entry.key_set.find(kid) {
            if entry.fetched_at.elapsed() < self.max_key_set_age {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache hit");
                return Ok(Some(key));
            }
            return Ok(self.refresh_stale(state, kid, key, cancel).await);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let Some(claim) = state.try_claim_refresh(self.min_refresh_interval) else {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache miss, refresh throttled");
            return Ok(None);
        };

        tracing::debug!("cache miss, refreshing key set");
        let entry = self.claimed_refresh(state, claim, cancel).await?;
        Ok(entry.key_set.find(kid))
    }

    /// Fetches the first snapshot. Concurrent first lookups wait for the
    /// one in progress and re-check what it published.
    async fn populate(
        &self,
        state: &CacheState,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<SigningKey>>, FetchError> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let _population = tokio::select! {
            biased;
            guard = state.population.lock() => guard,
            () = cancel.cancelled() => return Err(FetchError::cancelled()),
        };

        if let Some(entry) = state.snapshot.load_full() {
            return Ok(entry.key_set.find(kid));
        }

        let Some(claim) = state.try_claim_refresh(self.min_refresh_interval) else {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache empty, refresh throttled");
            return state.last_error.lock().clone().map_or(Ok(None), Err);
        };

        tracing::debug!("cache empty, fetching key set");
        let entry = self.claimed_refresh(state, claim, cancel).await?;
        Ok(entry.key_set.find(kid))
    }

    /// Runs a throttled refresh. The claim is kept on failure so the window
    /// still applies; a cancelled attempt hands it back.
    async fn claimed_refresh(
        &self,
        state: &CacheState,
        claim: RefreshClaim,
        cancel: &CancellationToken,
    ) -> Result<Arc<CacheEntry>, FetchError> {
        let result = self.refresh_with(state, cancel).await;
        if let Err(FetchError::Cancelled) = result {
            state.release_refresh(claim);
        }
        result
    }

    /// Refreshes a stale snapshot on a hit, serving the stale key if that fails.
    async fn refresh_stale(
        &self,
        state: &CacheState,
        kid: &str,
        stale: Arc<SigningKey>,
        cancel: &CancellationToken,
    ) -> Option<Arc<SigningKey>> {
        let Some(claim) = state.try_claim_refresh(self.min_refresh_interval) else {
            self.stale_served.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("stale hit, refresh already claimed");
            return Some(stale);
        };

        match self.claimed_refresh(state, claim, cancel).await {
            Ok(entry) => entry.key_set.find(kid),
            Err(e) => {
                self.stale_served.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "serving stale signing key, key set refresh failed");
                Some(stale)
            },
        }
    }

    /// Fetches the key set now, bypassing the throttle.
    ///
    /// Use on known key rotation events. The snapshot is replaced, never
    /// cleared. Returns the number of keys in the snapshot published
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of the failed fetch.
    pub async fn force_refresh(&self) -> Result<usize, FetchError> {
        let entry = self.refresh_with(self.state(), &CancellationToken::new()).await?;
        Ok(entry.key_set.len())
    }

    #[tracing::instrument(
        skip(self, state, cancel),
        fields(url = %self.jwks_url, generation = tracing::field::Empty)
    )]
    async fn refresh_with(
        &self,
        state: &CacheState,
        cancel: &CancellationToken,
    ) -> Result<Arc<CacheEntry>, FetchError> {
        let generation = state.next_generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::Span::current().record("generation", generation);

        fail_point!("key-cache-before-fetch", |_| {
            let err = FetchError::transport("injected failure before key set fetch");
            self.refresh_errors.fetch_add(1, Ordering::Relaxed);
            *state.last_error.lock() = Some(err.clone());
            Err(err)
        });

        let fetch = tokio::time::timeout(self.fetch_timeout, self.source.fetch(&self.jwks_url));
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::cancelled()),
            () = self.cancel_token.cancelled() => Err(FetchError::cancelled()),
            result = fetch => result.unwrap_or_else(|_| Err(FetchError::timeout(self.fetch_timeout))),
        };

        let key_set = match outcome {
            Ok(key_set) => key_set,
            Err(e) => {
                self.refresh_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "key set refresh failed");
                if !matches!(e, FetchError::Cancelled) {
                    *state.last_error.lock() = Some(e.clone());
                }
                return Err(e);
            },
        };
        *state.last_error.lock() = None;

        let entry = Arc::new(CacheEntry { key_set, fetched_at: Instant::now(), generation });
        let previous = state.snapshot.rcu(|current| match current {
            Some(current) if current.generation > generation => Some(Arc::clone(current)),
            _ => Some(Arc::clone(&entry)),
        });
        let published = previous.as_ref().is_none_or(|p| p.generation <= generation);

        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(key_count = entry.key_set.len(), published, "key set refreshed");

        // Callers re-check against whatever is current, not this fetch.
        Ok(state.snapshot.load_full().unwrap_or(entry))
    }

    /// Enables periodic background refresh at the given interval.
    ///
    /// The task ignores the miss throttle and keeps the snapshot younger
    /// than `max_key_set_age` during steady traffic. It holds only a weak
    /// reference and stops on [`shutdown`](Self::shutdown) or when the
    /// cache is dropped.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_refresh_interval(self: Arc<Self>, interval: Duration) -> Arc<Self> {
        let cache: Weak<Self> = Arc::downgrade(&self);
        let token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; consume it so we start
            // with a full interval wait.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::info!("background key set refresh shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        // Failures are logged and counted by the refresh itself.
                        let _ = cache.refresh_with(cache.state(), &CancellationToken::new()).await;
                    }
                }
            }
        });

        *self.refresh_handle.lock() = Some(handle);
        self
    }

    /// Stops the background refresh task and cancels in-flight refreshes.
    ///
    /// The current snapshot stays usable for lookups that hit it.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "background refresh task panicked");
        }
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
        }
    }

    /// Number of keys in the current snapshot (0 before the first fetch).
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.state
            .get()
            .and_then(|state| state.snapshot.load_full())
            .map_or(0, |entry| entry.key_set.len())
    }

    /// Returns the key source URL.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Returns the cancellation token that stops background work.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for KeyCache {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("jwks_url", &self.jwks_url)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .field("max_key_set_age", &self.max_key_set_age)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("initialized", &self.is_initialized())
            .field("key_count", &self.key_count())
            .finish_non_exhaustive()
    }
}
