//! Registry client - cache-first package metadata resolution.
//!
//! Resolution order for one package:
//! 1. Fresh disk-cache entry (age < TTL)
//! 2. In offline mode: any cached entry, otherwise unresolved (no network I/O)
//! 3. Rate-gated network fetch bounded by the configured timeout
//! 4. On failure: stale cached entry, otherwise unresolved
//!
//! Failures never escape [`RegistryClient::resolve`]; callers branch on the
//! returned [`Resolution`].

pub mod cache;
pub mod pypi;
pub mod rate_limit;

pub use cache::{CacheEntry, CacheLookup, DiskCache};
pub use pypi::PypiSource;
pub use rate_limit::RateLimiter;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::CheckerConfig;
use crate::error::RegistryError;
use crate::model::{normalize_name, PackageMetadata};
use crate::traits::RegistrySource;

// ============================================================================
// Outcomes
// ============================================================================

/// Why no metadata is available for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// Offline mode and nothing cached
    Offline,
    /// The registry does not know the package
    NotFound,
    /// Network failure with no cached fallback
    Unavailable(String),
}

/// Outcome of resolving one package.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Fresh(PackageMetadata),
    Stale(PackageMetadata),
    Unresolved(UnresolvedReason),
}

impl Resolution {
    pub fn metadata(&self) -> Option<&PackageMetadata> {
        match self {
            Self::Fresh(meta) | Self::Stale(meta) => Some(meta),
            Self::Unresolved(_) => None,
        }
    }
}

/// Snapshot of the client's diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Outbound network calls attempted
    pub requests_made: u64,
    /// Lookups answered from cache without network I/O
    pub cache_hits: u64,
    /// Failed fetches answered by an expired cache entry
    pub stale_fallbacks: u64,
    /// Failed network calls
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests_made: AtomicU64,
    cache_hits: AtomicU64,
    stale_fallbacks: AtomicU64,
    failures: AtomicU64,
}

// ============================================================================
// Client
// ============================================================================

/// Cache-backed, rate-limited registry client.
///
/// Construct once per checker and share it (`Arc`) across all lookups of a
/// run; the rate gate and counters are per client.
pub struct RegistryClient {
    source: Arc<dyn RegistrySource>,
    cache: DiskCache,
    limiter: RateLimiter,
    timeout: Duration,
    offline: bool,
    counters: Counters,
}

impl RegistryClient {
    pub fn new(
        source: Arc<dyn RegistrySource>,
        cache: DiskCache,
        rate_limit: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            limiter: RateLimiter::new(rate_limit),
            timeout,
            offline: false,
            counters: Counters::default(),
        }
    }

    /// Builds a `PyPI`-backed client from configuration.
    pub fn from_config(config: &CheckerConfig) -> Result<Self, RegistryError> {
        let source = PypiSource::new(config.registry_url.clone(), config.timeout())?;
        Ok(Self::with_source(Arc::new(source), config))
    }

    /// Builds a client around any source, taking cache/limits from configuration.
    pub fn with_source(source: Arc<dyn RegistrySource>, config: &CheckerConfig) -> Self {
        let cache = DiskCache::new(config.cache_dir(), config.cache_ttl());
        Self::new(source, cache, config.rate_limit(), config.timeout())
            .with_offline_mode(config.offline_mode)
    }

    pub fn with_offline_mode(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            requests_made: self.counters.requests_made.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            stale_fallbacks: self.counters.stale_fallbacks.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Resolves a package name to registry metadata.
    #[instrument(skip(self), fields(registry = self.source.registry_id()))]
    pub async fn resolve(&self, name: &str) -> Resolution {
        let key = normalize_name(name);
        let cached = self.cache.lookup(&key);

        if let CacheLookup::Fresh(entry) = cached {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(package = %key, "Cache hit");
            return Resolution::Fresh(entry.payload);
        }

        if self.offline {
            return match cached {
                CacheLookup::Stale(entry) => {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(package = %key, "Offline: using expired cache entry");
                    Resolution::Stale(entry.payload)
                }
                _ => {
                    debug!(package = %key, "Offline: no cache entry");
                    Resolution::Unresolved(UnresolvedReason::Offline)
                }
            };
        }

        self.limiter.acquire().await;
        self.counters.requests_made.fetch_add(1, Ordering::Relaxed);

        let fetched = match tokio::time::timeout(self.timeout, self.source.fetch(&key)).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout(self.timeout)),
        };

        match fetched {
            Ok(metadata) => {
                if let Err(e) = self.cache.store(&key, &metadata) {
                    warn!(package = %key, error = %e, "Failed to write cache entry");
                }
                Resolution::Fresh(metadata)
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                match cached {
                    CacheLookup::Stale(entry) => {
                        self.counters.stale_fallbacks.fetch_add(1, Ordering::Relaxed);
                        warn!(package = %key, error = %err, "Registry fetch failed, using stale cache entry");
                        Resolution::Stale(entry.payload)
                    }
                    _ => {
                        warn!(package = %key, error = %err, "Registry fetch failed, package unresolved");
                        let reason = if err.is_transient() {
                            UnresolvedReason::Unavailable(err.to_string())
                        } else {
                            UnresolvedReason::NotFound
                        };
                        Resolution::Unresolved(reason)
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
