//! Citation lookup orchestration.
//!
//! [`CitationLookup`] resolves one query record against the registered
//! sources by walking a [`StrategyPlan`]:
//!
//! | Tier | Strategies | Confidence |
//! |------|------------|------------|
//! | identifier | DOI, PMID, arXiv at the primary resolver, then secondary resolvers | fixed (0.95) |
//! | search | title search per non-slow source | similarity score |
//! | fallback | title variants, author+year, DOI prefix | similarity score |
//!
//! The first accepted candidate wins. Results, negative ones included, are
//! cached by fingerprint. Source failures never abort a lookup.
//!
//! # Example
//!
//! ```rust,no_run
//! use citation_auditor::config::Config;
//! use citation_auditor::lookup::CitationLookup;
//! use citation_auditor::models::CitationRecord;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let lookup = CitationLookup::from_config(&Config::default())?;
//! let query = CitationRecord::builder()
//!     .title("Attention is all you need")
//!     .author("Vaswani, Ashish")
//!     .year(2017)
//!     .build();
//!
//! let result = lookup.lookup(&query, true).await;
//! println!("found={} confidence={:.2}", result.found(), result.confidence());
//! # Ok(())
//! # }
//! ```

mod full_text;
mod strategy;

pub use full_text::has_full_text;
pub use strategy::{
    Attempt, AttemptOutcome, AuthorYearStrategy, IdentifierStrategy, LookupStrategy,
    PublisherPrefixStrategy, SearchStrategy, StrategyMatch, StrategyOutcome, StrategyPlan,
    VariantSearchStrategy,
};

use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::{CitationRecord, LookupResult, LookupTier};
use crate::sources::{SourceError, SourceRegistry};
use crate::utils::{fingerprint, CachedLookup, HttpClient, LookupCache, RateLimiter};

/// Fingerprint shared by queries with neither identifiers nor a title
const UNKNOWN_FINGERPRINT: &str = "unknown";

/// Multi-source citation lookup with caching
#[derive(Debug, Clone)]
pub struct CitationLookup {
    registry: SourceRegistry,
    plan: Arc<StrategyPlan>,
    cache: LookupCache,
    default_timeout: Duration,
}

impl CitationLookup {
    /// Create a lookup over `registry` with the standard strategy plan
    pub fn new(registry: SourceRegistry, cache: LookupCache, config: &Config) -> Self {
        let plan = StrategyPlan::from_registry(&registry, config);
        Self {
            registry,
            plan: Arc::new(plan),
            cache,
            default_timeout: config.lookup.timeout(),
        }
    }

    /// Build the full stack from configuration: rate limiter, HTTP client,
    /// the built-in sources and the cache
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let limiter = RateLimiter::new(config.rate_limits.clone());
        let client = Arc::new(HttpClient::from_config(&config.http, limiter)?);
        let registry = SourceRegistry::from_config(config, client);
        let cache = LookupCache::from_config(&config.cache);

        tracing::info!(
            "Lookup ready with sources: {}",
            registry.ids().collect::<Vec<_>>().join(", ")
        );
        Ok(Self::new(registry, cache, config))
    }

    /// Replace the strategy plan
    pub fn with_plan(mut self, plan: StrategyPlan) -> Self {
        self.plan = Arc::new(plan);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn plan(&self) -> &StrategyPlan {
        &self.plan
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Timeout used by [`CitationLookup::lookup_default`]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Look up a citation, returning the best match or a not-found result.
    ///
    /// Never fails: source errors are logged and recorded in the result's
    /// `attempts` detail.
    pub async fn lookup(&self, query: &CitationRecord, enable_fallbacks: bool) -> LookupResult {
        let query = query.normalized();
        let key = fingerprint(&query);

        // queries without identifiers or title would all share one entry
        if key == UNKNOWN_FINGERPRINT {
            return self.run(&query, &key, enable_fallbacks).await;
        }

        let entry = self
            .cache
            .get_or_compute(
                &key,
                |cached| cached.satisfies(enable_fallbacks),
                async {
                    CachedLookup {
                        result: self.run(&query, &key, enable_fallbacks).await,
                        fallbacks_attempted: enable_fallbacks,
                        ttl: self.cache.default_ttl(),
                    }
                },
            )
            .await;
        entry.result
    }

    /// [`CitationLookup::lookup`] bounded by `timeout`.
    ///
    /// On expiry the in-flight work is dropped, nothing is cached and a
    /// not-found result with `timed_out = true` is returned.
    pub async fn lookup_with_timeout(
        &self,
        query: &CitationRecord,
        enable_fallbacks: bool,
        timeout: Duration,
    ) -> LookupResult {
        match tokio::time::timeout(timeout, self.lookup(query, enable_fallbacks)).await {
            Ok(result) => result,
            Err(_) => {
                let key = fingerprint(&query.normalized());
                tracing::warn!("Lookup of {} timed out after {:?}", key, timeout);
                LookupResult::not_found()
                    .with_detail("fingerprint", key)
                    .with_detail("timed_out", true)
                    .with_detail("timeout_secs", timeout.as_secs_f64())
            }
        }
    }

    /// Lookup bounded by the configured `lookup.lookup_timeout_secs`
    pub async fn lookup_default(
        &self,
        query: &CitationRecord,
        enable_fallbacks: bool,
    ) -> LookupResult {
        self.lookup_with_timeout(query, enable_fallbacks, self.default_timeout)
            .await
    }

    /// Look up many citations, at most `concurrency` at a time. Results are
    /// returned in input order.
    pub async fn lookup_many(
        &self,
        queries: &[CitationRecord],
        enable_fallbacks: bool,
        concurrency: usize,
    ) -> Vec<LookupResult> {
        stream::iter(queries)
            .map(|query| self.lookup_default(query, enable_fallbacks))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Walk the plan until a strategy accepts a candidate
    async fn run(&self, query: &CitationRecord, key: &str, enable_fallbacks: bool) -> LookupResult {
        if query.is_empty() {
            tracing::debug!("Empty query, nothing to look up");
            return LookupResult::not_found()
                .with_detail("fingerprint", key)
                .with_detail("reason", "empty query");
        }

        let mut attempts: Vec<Attempt> = Vec::new();
        for strategy in self.plan.iter() {
            if strategy.tier() == LookupTier::Fallback && !enable_fallbacks {
                continue;
            }

            let outcome = strategy.attempt(query).await;
            attempts.extend(outcome.attempts);

            if let Some(matched) = outcome.matched {
                tracing::info!(
                    "Matched {} via {} (confidence {:.3})",
                    key,
                    matched.source,
                    matched.confidence
                );
                return matched_result(matched, key, &strategy.name(), &attempts);
            }
        }

        tracing::info!(
            "No match for {} after {} source calls",
            key,
            attempts.len()
        );
        LookupResult::not_found()
            .with_detail("fingerprint", key)
            .with_detail("attempts", to_json(&attempts))
            .with_detail("fallbacks_attempted", enable_fallbacks)
    }
}

fn matched_result(
    matched: StrategyMatch,
    key: &str,
    strategy: &str,
    attempts: &[Attempt],
) -> LookupResult {
    let full_text = has_full_text(&matched.record);
    let mut result = LookupResult::matched(
        matched.record,
        matched.source,
        matched.tier,
        matched.confidence,
    )
    .with_full_text(full_text)
    .with_detail("fingerprint", key)
    .with_detail("strategy", strategy)
    .with_detail("attempts", to_json(attempts));

    if let Some(breakdown) = matched.breakdown {
        result = result.with_detail("score", to_json(&breakdown));
    }
    if let Some(query_text) = matched.query_text {
        result = result.with_detail("query", query_text);
    }
    result
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
