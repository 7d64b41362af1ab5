//! In-memory cache for lookup results.
//!
//! Entries are keyed by citation fingerprint, expire after a per-entry TTL and
//! are evicted least-recently-used once capacity is reached. Concurrent
//! lookups of the same fingerprint share one computation.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::matching::normalize_title;
use crate::models::{CitationRecord, LookupResult};

/// Number of normalized title characters that enter a fingerprint
const TITLE_KEY_CHARS: usize = 50;

/// A cached lookup outcome
#[derive(Debug, Clone)]
pub struct CachedLookup {
    pub result: LookupResult,

    /// Whether the fallback tier ran when this result was computed
    pub fallbacks_attempted: bool,

    pub ttl: Duration,
}

impl CachedLookup {
    /// Whether this entry answers a lookup with the given fallback setting.
    ///
    /// A negative result computed without fallbacks cannot answer a lookup
    /// that is allowed to try them.
    pub fn satisfies(&self, enable_fallbacks: bool) -> bool {
        self.result.found() || self.fallbacks_attempted || !enable_fallbacks
    }
}

struct PerEntryTtl;

impl Expiry<String, CachedLookup> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedLookup,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedLookup,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded TTL cache of lookup results
#[derive(Clone)]
pub struct LookupCache {
    inner: Cache<String, CachedLookup>,
    default_ttl: Duration,
}

impl std::fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("entries", &self.inner.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl LookupCache {
    pub fn new(max_entries: u64, default_ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();
        Self { inner, default_ttl }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch an unexpired entry
    pub async fn get(&self, key: &str) -> Option<CachedLookup> {
        let hit = self.inner.get(key).await;
        match &hit {
            Some(_) => tracing::debug!("Cache HIT for {}", key),
            None => tracing::debug!("Cache MISS for {}", key),
        }
        hit
    }

    /// Store a result with an explicit TTL
    pub async fn put(&self, key: &str, result: LookupResult, fallbacks_attempted: bool, ttl: Duration) {
        self.inner
            .insert(
                key.to_string(),
                CachedLookup {
                    result,
                    fallbacks_attempted,
                    ttl,
                },
            )
            .await;
    }

    /// Store a result with the default TTL
    pub async fn insert(&self, key: &str, result: LookupResult, fallbacks_attempted: bool) {
        self.put(key, result, fallbacks_attempted, self.default_ttl)
            .await;
    }

    /// Return the cached entry for `key` when it satisfies `usable`,
    /// otherwise run `init` and cache its output.
    ///
    /// Concurrent callers with the same key wait on a single `init`.
    pub async fn get_or_compute<F>(
        &self,
        key: &str,
        mut usable: impl FnMut(&CachedLookup) -> bool + Send,
        init: F,
    ) -> CachedLookup
    where
        F: Future<Output = CachedLookup>,
    {
        let entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with_if(init, |cached| !usable(cached))
            .await;
        if entry.is_fresh() {
            tracing::debug!("Cache MISS for {}", key);
        } else {
            tracing::debug!("Cache HIT for {}", key);
        }
        entry.into_value()
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of live entries
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Cache key for a query record.
///
/// Identifiers come first, then a prefix of the normalized title. Records
/// with neither share the key `unknown`.
pub fn fingerprint(record: &CitationRecord) -> String {
    let mut parts = Vec::new();
    if let Some(doi) = &record.doi {
        parts.push(format!("doi:{}", doi));
    }
    if let Some(pmid) = &record.pmid {
        parts.push(format!("pmid:{}", pmid));
    }
    if let Some(arxiv) = &record.arxiv_id {
        parts.push(format!("arxiv:{}", arxiv));
    }
    if let Some(title) = record.title_text() {
        let normalized: String = normalize_title(title)
            .chars()
            .take(TITLE_KEY_CHARS)
            .collect();
        if !normalized.is_empty() {
            parts.push(format!("title:{}", normalized));
        }
    }

    if parts.is_empty() {
        "unknown".to_string()
    } else {
        parts.join("|")
    }
}
