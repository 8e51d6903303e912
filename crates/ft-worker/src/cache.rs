//! Cache generations and the cache storage the worker writes them to.
//!
//! The worker keeps exactly two live caches, named
//! `{prefix}-static-{suffix}` and `{prefix}-runtime-{suffix}`. Bumping the
//! suffix in a new deploy makes every existing cache stale at once; stale
//! caches are removed when the new worker activates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::CacheError;
use crate::http::Response;

/// Default cache size budget across all caches (25 MB).
pub const DEFAULT_QUOTA_BYTES: usize = 25 * 1024 * 1024;

/// The two logical caches the worker manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheGeneration {
    /// Install-time shell assets, immutable per deploy.
    Static,
    /// Responses fetched during normal operation.
    Runtime,
}

impl CacheGeneration {
    /// Name fragment used in the cache name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Runtime => "runtime",
        }
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Concrete cache names for one deployed worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    static_name: String,
    runtime_name: String,
}

impl CacheNames {
    /// Build the names from a prefix (`ft`) and version suffix (`v1`).
    #[must_use]
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self {
            static_name: format!("{prefix}-{}-{suffix}", CacheGeneration::Static.label()),
            runtime_name: format!("{prefix}-{}-{suffix}", CacheGeneration::Runtime.label()),
        }
    }

    /// Name of the given generation.
    #[must_use]
    pub fn name(&self, generation: CacheGeneration) -> &str {
        match generation {
            CacheGeneration::Static => &self.static_name,
            CacheGeneration::Runtime => &self.runtime_name,
        }
    }

    /// Whether `name` is one of the two current caches.
    #[must_use]
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.runtime_name
    }
}

/// Named caches of responses keyed by request path (plus query).
///
/// Implementations must tolerate concurrent writers to the same key; the last
/// write wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every existing cache.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Create the cache if it does not exist.
    async fn open(&self, cache: &str) -> Result<(), CacheError>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, cache: &str) -> Result<bool, CacheError>;

    /// Look up an entry in one cache.
    async fn match_in(&self, cache: &str, key: &str) -> Result<Option<Response>, CacheError>;

    /// Store an entry, creating the cache if needed.
    async fn put(&self, cache: &str, key: &str, response: Response) -> Result<(), CacheError>;

    /// Number of entries in a cache, `None` if it does not exist.
    async fn entry_count(&self, cache: &str) -> Result<Option<usize>, CacheError>;
}

#[derive(Debug, Default)]
struct MemoryCache {
    entries: BTreeMap<String, Response>,
    total_size: usize,
}

impl MemoryCache {
    fn put(&mut self, key: &str, response: Response) {
        let size = response.body.len();
        if let Some(old) = self.entries.insert(key.to_string(), response) {
            self.total_size = self.total_size.saturating_sub(old.body.len());
        }
        self.total_size += size;
    }
}

/// In-memory cache storage with a size quota.
#[derive(Debug)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, MemoryCache>>,
    quota_bytes: usize,
}

impl Default for MemoryCacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStorage {
    /// Empty storage with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    /// Empty storage with a custom quota in bytes.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            caches: RwLock::new(BTreeMap::new()),
            quota_bytes,
        }
    }

    /// Total body bytes across all caches.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|c| c.total_size)
            .sum()
    }

    /// Keys stored in one cache, sorted.
    #[must_use]
    pub fn entry_keys(&self, cache: &str) -> Vec<String> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cache)
            .map(|c| c.entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        Ok(caches.keys().cloned().collect())
    }

    async fn open(&self, cache: &str) -> Result<(), CacheError> {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        caches.entry(cache.to_string()).or_default();
        Ok(())
    }

    async fn delete(&self, cache: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        Ok(caches.remove(cache).is_some())
    }

    async fn match_in(&self, cache: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        Ok(caches.get(cache).and_then(|c| c.entries.get(key)).cloned())
    }

    async fn put(&self, cache: &str, key: &str, response: Response) -> Result<(), CacheError> {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);

        let used: usize = caches.values().map(|c| c.total_size).sum();
        let replaced = caches
            .get(cache)
            .and_then(|c| c.entries.get(key))
            .map_or(0, |old| old.body.len());
        if used - replaced + response.body.len() > self.quota_bytes {
            return Err(CacheError::QuotaExceeded);
        }

        caches.entry(cache.to_string()).or_default().put(key, response);
        Ok(())
    }

    async fn entry_count(&self, cache: &str) -> Result<Option<usize>, CacheError> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        Ok(caches.get(cache).map(|c| c.entries.len()))
    }
}
