//! Lookup strategies and the ordered plan that runs them.
//!
//! Each strategy wraps one way of finding a citation: resolving an
//! identifier at one source, searching one source by title, or one of the
//! relaxed fallback searches. The orchestrator walks a [`StrategyPlan`] in
//! order and stops at the first match.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::matching::{extract_surname, query_variants, ScoreBreakdown, SimilarityScorer};
use crate::models::{CitationRecord, IdentifierKind, LookupTier, ServiceTag};
use crate::sources::{SearchQuery, Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::utils::doi_prefix;

/// A candidate accepted by a strategy
#[derive(Debug, Clone)]
pub struct StrategyMatch {
    pub record: CitationRecord,
    pub source: ServiceTag,
    pub tier: LookupTier,
    pub confidence: f64,
    /// Similarity of the accepted candidate, absent for identifier matches
    pub breakdown: Option<ScoreBreakdown>,
    /// Search text that produced the candidate
    pub query_text: Option<String>,
}

/// How one call to one source went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Matched,
    /// Candidates came back but none reached the threshold
    BelowThreshold,
    NoResults,
    Error,
}

/// Diagnostic record of one source call made by a strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub strategy: String,
    pub source: String,
    pub tier: LookupTier,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of running one strategy
#[derive(Debug, Clone, Default)]
pub struct StrategyOutcome {
    pub matched: Option<StrategyMatch>,
    pub attempts: Vec<Attempt>,
}

impl StrategyOutcome {
    /// The strategy does not apply to this query
    pub fn skipped() -> Self {
        Self::default()
    }
}

/// One way of finding a citation
#[async_trait]
pub trait LookupStrategy: Send + Sync + fmt::Debug {
    fn tier(&self) -> LookupTier;

    /// Short name used in diagnostics, e.g. `crossref_search`
    fn name(&self) -> String;

    /// Try to find `query`. Source failures are recorded in the outcome and
    /// never returned as errors.
    async fn attempt(&self, query: &CitationRecord) -> StrategyOutcome;
}

/// Log a source failure at a level matching its kind
fn log_failure(strategy: &str, source: &str, err: &SourceError) {
    match err {
        SourceError::NotFound(_) | SourceError::NotImplemented => {
            tracing::debug!("{}: {} found nothing: {}", strategy, source, err)
        }
        e if e.is_transient() => {
            tracing::warn!("{}: transient failure from {}: {}", strategy, source, e)
        }
        e => tracing::warn!("{}: {} failed: {}", strategy, source, e),
    }
}

/// Scores candidate lists and applies the acceptance threshold
#[derive(Debug, Clone, Copy)]
struct CandidateFilter {
    scorer: SimilarityScorer,
    threshold: f64,
}

impl CandidateFilter {
    /// Best candidate by score. Ties keep the earlier candidate.
    fn best(
        &self,
        query: &CitationRecord,
        candidates: Vec<CitationRecord>,
    ) -> Option<(CitationRecord, ScoreBreakdown)> {
        let mut best: Option<(CitationRecord, ScoreBreakdown)> = None;
        for candidate in candidates {
            let breakdown = self.scorer.score(query, &candidate);
            let better = match &best {
                Some((_, current)) => breakdown.total > current.total,
                None => true,
            };
            if better {
                best = Some((candidate, breakdown));
            }
        }
        best
    }

    /// Run one search call and turn its response into an attempt and an
    /// optional accepted match
    fn evaluate(
        &self,
        strategy: &str,
        tier: LookupTier,
        source: &dyn Source,
        query: &CitationRecord,
        query_text: &str,
        response: Result<Vec<CitationRecord>, SourceError>,
    ) -> (Attempt, Option<(CitationRecord, ScoreBreakdown)>) {
        let mut attempt = Attempt {
            strategy: strategy.to_string(),
            source: source.id().to_string(),
            tier,
            outcome: AttemptOutcome::NoResults,
            query: Some(query_text.to_string()),
            best_score: None,
            error: None,
        };

        let candidates = match response {
            Ok(candidates) => candidates,
            Err(e) => {
                log_failure(strategy, source.id(), &e);
                attempt.outcome = AttemptOutcome::Error;
                attempt.error = Some(e.to_string());
                return (attempt, None);
            }
        };

        let Some((record, breakdown)) = self.best(query, candidates) else {
            return (attempt, None);
        };
        attempt.best_score = Some(breakdown.total);

        if breakdown.total >= self.threshold {
            attempt.outcome = AttemptOutcome::Matched;
            (attempt, Some((record, breakdown)))
        } else {
            tracing::debug!(
                "{}: best {} candidate scored {:.3}, below {:.2}",
                strategy,
                source.id(),
                breakdown.total,
                self.threshold
            );
            attempt.outcome = AttemptOutcome::BelowThreshold;
            (attempt, None)
        }
    }
}

/// Surname of the first author, for search filters
fn first_surname(query: &CitationRecord) -> Option<String> {
    query.authors.iter().find_map(|a| extract_surname(a))
}

// ===== Tier 1 =====

/// Resolve one identifier kind at one source
#[derive(Debug)]
pub struct IdentifierStrategy {
    source: Arc<dyn Source>,
    kind: IdentifierKind,
    primary: bool,
    confidence: f64,
}

impl IdentifierStrategy {
    /// `primary` marks the source as the native resolver of `kind`
    pub fn new(source: Arc<dyn Source>, kind: IdentifierKind, primary: bool, confidence: f64) -> Self {
        Self {
            source,
            kind,
            primary,
            confidence,
        }
    }

    fn tag(&self) -> ServiceTag {
        if self.primary {
            ServiceTag::identifier(self.kind)
        } else {
            ServiceTag::secondary_identifier(self.source.id(), self.kind)
        }
    }
}

#[async_trait]
impl LookupStrategy for IdentifierStrategy {
    fn tier(&self) -> LookupTier {
        LookupTier::Identifier
    }

    fn name(&self) -> String {
        format!("{}_{}", self.source.id(), self.kind)
    }

    async fn attempt(&self, query: &CitationRecord) -> StrategyOutcome {
        let Some(id) = query.identifier(self.kind) else {
            return StrategyOutcome::skipped();
        };

        let name = self.name();
        let mut attempt = Attempt {
            strategy: name.clone(),
            source: self.source.id().to_string(),
            tier: LookupTier::Identifier,
            outcome: AttemptOutcome::NoResults,
            query: Some(id.to_string()),
            best_score: None,
            error: None,
        };

        let matched = match self.source.resolve(self.kind, id).await {
            Ok(record) => {
                attempt.outcome = AttemptOutcome::Matched;
                Some(StrategyMatch {
                    // identifiers from the query fill gaps in the catalog record
                    record: record.merge(query),
                    source: self.tag(),
                    tier: LookupTier::Identifier,
                    confidence: self.confidence,
                    breakdown: None,
                    query_text: Some(id.to_string()),
                })
            }
            Err(SourceError::NotFound(_)) => None,
            Err(e) => {
                log_failure(&name, self.source.id(), &e);
                attempt.outcome = AttemptOutcome::Error;
                attempt.error = Some(e.to_string());
                None
            }
        };

        StrategyOutcome {
            matched,
            attempts: vec![attempt],
        }
    }
}

// ===== Tier 2 =====

/// Title search at one source
#[derive(Debug)]
pub struct SearchStrategy {
    source: Arc<dyn Source>,
    filter: CandidateFilter,
    max_results: usize,
}

impl SearchStrategy {
    pub fn new(source: Arc<dyn Source>, threshold: f64, max_results: usize) -> Self {
        Self {
            source,
            filter: CandidateFilter {
                scorer: SimilarityScorer::new(),
                threshold,
            },
            max_results,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.filter.threshold
    }
}

#[async_trait]
impl LookupStrategy for SearchStrategy {
    fn tier(&self) -> LookupTier {
        LookupTier::Search
    }

    fn name(&self) -> String {
        format!("{}_search", self.source.id())
    }

    async fn attempt(&self, query: &CitationRecord) -> StrategyOutcome {
        let Some(title) = query.title_text() else {
            return StrategyOutcome::skipped();
        };

        let mut search = SearchQuery::new(title).max_results(self.max_results);
        if let Some(surname) = first_surname(query) {
            search = search.author(surname);
        }
        if let Some(year) = query.year {
            search = search.year(year);
        }

        let name = self.name();
        let response = self.source.search(&search).await;
        let (attempt, accepted) = self.filter.evaluate(
            &name,
            LookupTier::Search,
            self.source.as_ref(),
            query,
            title,
            response,
        );

        StrategyOutcome {
            matched: accepted.map(|(record, breakdown)| StrategyMatch {
                record,
                source: ServiceTag::search(self.source.id()),
                tier: LookupTier::Search,
                confidence: breakdown.total,
                breakdown: Some(breakdown),
                query_text: Some(title.to_string()),
            }),
            attempts: vec![attempt],
        }
    }
}

// ===== Tier 3 =====

/// Relaxed title variants across every search-capable source
#[derive(Debug)]
pub struct VariantSearchStrategy {
    sources: Vec<Arc<dyn Source>>,
    filter: CandidateFilter,
    max_variants: usize,
    max_results: usize,
}

impl VariantSearchStrategy {
    pub fn new(
        sources: Vec<Arc<dyn Source>>,
        threshold: f64,
        max_variants: usize,
        max_results: usize,
    ) -> Self {
        Self {
            sources,
            filter: CandidateFilter {
                scorer: SimilarityScorer::new(),
                threshold,
            },
            max_variants,
            max_results,
        }
    }
}

#[async_trait]
impl LookupStrategy for VariantSearchStrategy {
    fn tier(&self) -> LookupTier {
        LookupTier::Fallback
    }

    fn name(&self) -> String {
        "variant_search".to_string()
    }

    async fn attempt(&self, query: &CitationRecord) -> StrategyOutcome {
        let Some(title) = query.title_text() else {
            return StrategyOutcome::skipped();
        };

        let name = self.name();
        let mut outcome = StrategyOutcome::default();
        for variant in query_variants(title, self.max_variants) {
            let search = SearchQuery::new(variant.as_str()).max_results(self.max_results);
            for source in &self.sources {
                let response = source.search(&search).await;
                let (attempt, accepted) = self.filter.evaluate(
                    &name,
                    LookupTier::Fallback,
                    source.as_ref(),
                    query,
                    &variant,
                    response,
                );
                outcome.attempts.push(attempt);

                if let Some((record, breakdown)) = accepted {
                    outcome.matched = Some(StrategyMatch {
                        record,
                        source: ServiceTag::fallback(source.id()),
                        tier: LookupTier::Fallback,
                        confidence: breakdown.total,
                        breakdown: Some(breakdown),
                        query_text: Some(variant),
                    });
                    return outcome;
                }
            }
        }
        outcome
    }
}

/// Search by first author and year
#[derive(Debug)]
pub struct AuthorYearStrategy {
    sources: Vec<Arc<dyn Source>>,
    filter: CandidateFilter,
    max_results: usize,
}

impl AuthorYearStrategy {
    pub fn new(sources: Vec<Arc<dyn Source>>, threshold: f64, max_results: usize) -> Self {
        Self {
            sources,
            filter: CandidateFilter {
                scorer: SimilarityScorer::new(),
                threshold,
            },
            max_results,
        }
    }
}

#[async_trait]
impl LookupStrategy for AuthorYearStrategy {
    fn tier(&self) -> LookupTier {
        LookupTier::Fallback
    }

    fn name(&self) -> String {
        "author_year".to_string()
    }

    async fn attempt(&self, query: &CitationRecord) -> StrategyOutcome {
        let (Some(surname), Some(year)) = (first_surname(query), query.year) else {
            return StrategyOutcome::skipped();
        };

        let name = self.name();
        let query_text = format!("{} {}", surname, year);
        let mut outcome = StrategyOutcome::default();
        for source in &self.sources {
            let response = source
                .search_by_author(&surname, self.max_results, Some(year))
                .await;

            // Without a title every paper by the author that year scores the
            // same, so only an unambiguous answer is usable.
            let response = match response {
                Ok(candidates) if query.title_text().is_none() && candidates.len() > 1 => {
                    tracing::debug!(
                        "{}: {} returned {} candidates for an untitled query",
                        name,
                        source.id(),
                        candidates.len()
                    );
                    Ok(Vec::new())
                }
                other => other,
            };

            let (attempt, accepted) = self.filter.evaluate(
                &name,
                LookupTier::Fallback,
                source.as_ref(),
                query,
                &query_text,
                response,
            );
            outcome.attempts.push(attempt);

            if let Some((record, breakdown)) = accepted {
                outcome.matched = Some(StrategyMatch {
                    record,
                    source: ServiceTag::author_year(source.id()),
                    tier: LookupTier::Fallback,
                    confidence: breakdown.total,
                    breakdown: Some(breakdown),
                    query_text: Some(query_text),
                });
                return outcome;
            }
        }
        outcome
    }
}

/// Title search restricted to the registrant prefix of the query's DOI
#[derive(Debug)]
pub struct PublisherPrefixStrategy {
    sources: Vec<Arc<dyn Source>>,
    filter: CandidateFilter,
    max_results: usize,
}

impl PublisherPrefixStrategy {
    pub fn new(sources: Vec<Arc<dyn Source>>, threshold: f64, max_results: usize) -> Self {
        Self {
            sources,
            filter: CandidateFilter {
                scorer: SimilarityScorer::new(),
                threshold,
            },
            max_results,
        }
    }
}

#[async_trait]
impl LookupStrategy for PublisherPrefixStrategy {
    fn tier(&self) -> LookupTier {
        LookupTier::Fallback
    }

    fn name(&self) -> String {
        "publisher_prefix".to_string()
    }

    async fn attempt(&self, query: &CitationRecord) -> StrategyOutcome {
        let (Some(title), Some(prefix)) = (
            query.title_text(),
            query.doi.as_deref().and_then(doi_prefix),
        ) else {
            return StrategyOutcome::skipped();
        };

        let name = self.name();
        let search = SearchQuery::new(title)
            .doi_prefix(prefix.as_str())
            .max_results(self.max_results);
        let query_text = format!("{} [prefix:{}]", title, prefix);

        let mut outcome = StrategyOutcome::default();
        for source in &self.sources {
            let response = source.search(&search).await;
            let (attempt, accepted) = self.filter.evaluate(
                &name,
                LookupTier::Fallback,
                source.as_ref(),
                query,
                &query_text,
                response,
            );
            outcome.attempts.push(attempt);

            if let Some((record, breakdown)) = accepted {
                outcome.matched = Some(StrategyMatch {
                    record,
                    source: ServiceTag::prefix(source.id()),
                    tier: LookupTier::Fallback,
                    confidence: breakdown.total,
                    breakdown: Some(breakdown),
                    query_text: Some(query_text),
                });
                return outcome;
            }
        }
        outcome
    }
}

// ===== Plan =====

/// Ordered list of strategies, most reliable first
#[derive(Debug, Default)]
pub struct StrategyPlan {
    strategies: Vec<Box<dyn LookupStrategy>>,
}

impl StrategyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy at the lowest priority
    pub fn push(&mut self, strategy: Box<dyn LookupStrategy>) {
        self.strategies.push(strategy);
    }

    /// Compose the standard plan from a registry's capabilities.
    ///
    /// Tier 1: each identifier kind at its primary resolver (DOI, PMID,
    /// arXiv), then every other resolver in registry order. Tier 2: title
    /// search at each search-capable source that is not slow. Tier 3: variant
    /// search over all search-capable sources, author+year search, then
    /// DOI-prefix search.
    pub fn from_registry(registry: &SourceRegistry, config: &Config) -> Self {
        let thresholds = &config.thresholds;
        let max_results = config.lookup.max_results;
        let mut plan = Self::new();

        let primaries: Vec<(IdentifierKind, Arc<dyn Source>)> = IdentifierKind::ALL
            .iter()
            .filter_map(|kind| registry.primary_for(*kind).map(|s| (*kind, Arc::clone(s))))
            .collect();

        for (kind, source) in &primaries {
            plan.push(Box::new(IdentifierStrategy::new(
                Arc::clone(source),
                *kind,
                true,
                thresholds.identifier,
            )));
        }

        for source in registry.all() {
            for kind in IdentifierKind::ALL {
                let is_primary = primaries
                    .iter()
                    .any(|(k, p)| *k == kind && p.id() == source.id());
                if source.supports_identifier(kind) && !is_primary {
                    plan.push(Box::new(IdentifierStrategy::new(
                        Arc::clone(source),
                        kind,
                        false,
                        thresholds.identifier,
                    )));
                }
            }
        }

        for source in registry.with_capability(SourceCapabilities::SEARCH) {
            if !source.is_slow() {
                plan.push(Box::new(SearchStrategy::new(
                    Arc::clone(source),
                    thresholds.search_threshold(source.id()),
                    max_results,
                )));
            }
        }

        let searchable: Vec<Arc<dyn Source>> = registry
            .with_capability(SourceCapabilities::SEARCH)
            .into_iter()
            .cloned()
            .collect();
        if !searchable.is_empty() {
            plan.push(Box::new(VariantSearchStrategy::new(
                searchable,
                thresholds.fallback,
                config.lookup.max_variants,
                max_results,
            )));
        }

        let by_author: Vec<Arc<dyn Source>> = registry
            .with_capability(SourceCapabilities::AUTHOR_SEARCH)
            .into_iter()
            .cloned()
            .collect();
        if !by_author.is_empty() {
            plan.push(Box::new(AuthorYearStrategy::new(
                by_author,
                thresholds.fallback,
                max_results,
            )));
        }

        let by_prefix: Vec<Arc<dyn Source>> = registry
            .with_capability(SourceCapabilities::PREFIX_SEARCH)
            .into_iter()
            .cloned()
            .collect();
        if !by_prefix.is_empty() {
            plan.push(Box::new(PublisherPrefixStrategy::new(
                by_prefix,
                thresholds.fallback,
                max_results,
            )));
        }

        plan
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LookupStrategy> {
        self.strategies.iter().map(|s| s.as_ref())
    }

    /// Strategy names in order
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;

    fn caps(extra: SourceCapabilities) -> SourceCapabilities {
        SourceCapabilities::SEARCH | extra
    }

    fn registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("crossref").with_capabilities(caps(
            SourceCapabilities::DOI_LOOKUP
                | SourceCapabilities::AUTHOR_SEARCH
                | SourceCapabilities::PREFIX_SEARCH,
        ))));
        registry.register(Arc::new(
            MockSource::new("pubmed").with_capabilities(caps(SourceCapabilities::PMID_LOOKUP)),
        ));
        registry.register(Arc::new(MockSource::new("semantic_scholar").with_capabilities(
            caps(SourceCapabilities::DOI_LOOKUP | SourceCapabilities::PMID_LOOKUP),
        )));
        registry.register(Arc::new(
            MockSource::new("web").with_capabilities(caps(SourceCapabilities::SLOW)),
        ));
        registry
    }

    #[test]
    fn test_plan_order() {
        let plan = StrategyPlan::from_registry(&registry(), &Config::default());
        assert_eq!(
            plan.names(),
            vec![
                "crossref_doi",
                "pubmed_pmid",
                "semantic_scholar_doi",
                "semantic_scholar_pmid",
                "crossref_search",
                "pubmed_search",
                "semantic_scholar_search",
                "variant_search",
                "author_year",
                "publisher_prefix",
            ]
        );
        let tiers: Vec<_> = plan.iter().map(|s| s.tier()).collect();
        assert!(tiers.windows(2).all(|w| w[0] as u8 <= w[1] as u8));
    }

    #[test]
    fn test_per_service_threshold() {
        let mut config = Config::default();
        config
            .thresholds
            .per_service
            .insert("pubmed".to_string(), 0.7);
        let source: Arc<dyn Source> = Arc::new(MockSource::new("pubmed"));
        let strategy = SearchStrategy::new(
            Arc::clone(&source),
            config.thresholds.search_threshold(source.id()),
            5,
        );
        assert_eq!(strategy.threshold(), 0.7);
    }

    #[test]
    fn test_best_candidate_ties_keep_first() {
        let filter = CandidateFilter {
            scorer: SimilarityScorer::new(),
            threshold: 0.5,
        };
        let query = CitationRecord::builder().title("Deep Residual Learning").build();
        let first = CitationRecord::builder()
            .title("Deep Residual Learning")
            .url("https://a.example")
            .build();
        let second = CitationRecord::builder()
            .title("Deep Residual Learning")
            .url("https://b.example")
            .build();

        let (best, _) = filter.best(&query, vec![first, second]).unwrap();
        assert_eq!(best.url.as_deref(), Some("https://a.example"));
    }

    #[tokio::test]
    async fn test_identifier_strategy_tags() {
        let record = CitationRecord::builder().title("Deep Learning").build();
        let source: Arc<dyn Source> = Arc::new(
            MockSource::new("semantic_scholar")
                .with_capabilities(SourceCapabilities::DOI_LOOKUP)
                .with_record(IdentifierKind::Doi, "10.1038/nature14539", record),
        );
        let query = CitationRecord::builder()
            .doi("10.1038/nature14539")
            .year(2015)
            .build();

        let secondary = IdentifierStrategy::new(Arc::clone(&source), IdentifierKind::Doi, false, 0.95);
        let outcome = secondary.attempt(&query).await;
        let matched = outcome.matched.unwrap();
        assert_eq!(matched.source.as_str(), "semantic_scholar_doi");
        assert_eq!(matched.confidence, 0.95);
        // gaps in the catalog record are filled from the query
        assert_eq!(matched.record.year, Some(2015));
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Matched);

        let primary = IdentifierStrategy::new(source, IdentifierKind::Doi, true, 0.95);
        assert_eq!(
            primary.attempt(&query).await.matched.unwrap().source.as_str(),
            "doi"
        );
    }

    #[tokio::test]
    async fn test_identifier_strategy_skips_missing_identifier() {
        let source: Arc<dyn Source> = Arc::new(MockSource::new("pubmed"));
        let strategy = IdentifierStrategy::new(Arc::clone(&source), IdentifierKind::Pmid, true, 0.95);
        let outcome = strategy
            .attempt(&CitationRecord::builder().title("No PMID").build())
            .await;
        assert!(outcome.matched.is_none());
        assert!(outcome.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_search_strategy_threshold() {
        let candidate = CitationRecord::builder()
            .title("A Completely Different Paper About Birds")
            .build();
        let source = Arc::new(MockSource::new("crossref").with_search_results(vec![candidate]));
        let strategy = SearchStrategy::new(source.clone(), 0.65, 5);
        let query = CitationRecord::builder()
            .title("Deep Residual Learning for Image Recognition")
            .author("He, Kaiming")
            .year(2016)
            .build();

        let outcome = strategy.attempt(&query).await;
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::BelowThreshold);

        let sent = &source.queries()[0];
        assert_eq!(sent.author.as_deref(), Some("he"));
        assert_eq!(sent.year, Some(2016));
    }

    #[tokio::test]
    async fn test_search_strategy_records_errors() {
        let source = Arc::new(MockSource::new("openalex").fail_with_status(500));
        let strategy = SearchStrategy::new(source, 0.65, 5);
        let outcome = strategy
            .attempt(&CitationRecord::builder().title("Anything at all").build())
            .await;

        assert!(outcome.matched.is_none());
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Error);
        assert!(outcome.attempts[0].error.is_some());
    }

    #[tokio::test]
    async fn test_author_year_rejects_ambiguous_untitled_query() {
        let papers = vec![
            CitationRecord::builder().title("One").author("Smith, J").year(2020).build(),
            CitationRecord::builder().title("Two").author("Smith, J").year(2020).build(),
        ];
        let source: Arc<dyn Source> = Arc::new(
            MockSource::new("crossref")
                .with_capabilities(SourceCapabilities::AUTHOR_SEARCH)
                .with_author_results(papers),
        );
        let strategy = AuthorYearStrategy::new(vec![source], 0.5, 5);
        let query = CitationRecord::builder().author("Smith, J").year(2020).build();

        let outcome = strategy.attempt(&query).await;
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::NoResults);
    }

    #[tokio::test]
    async fn test_prefix_strategy_sends_prefix() {
        let source = Arc::new(
            MockSource::new("crossref").with_capabilities(caps(SourceCapabilities::PREFIX_SEARCH)),
        );
        let strategy =
            PublisherPrefixStrategy::new(vec![source.clone() as Arc<dyn Source>], 0.5, 5);
        let query = CitationRecord::builder()
            .title("Deep learning")
            .doi("10.1038/nature-wrong")
            .build();

        let outcome = strategy.attempt(&query).await;
        assert!(outcome.matched.is_none());
        assert_eq!(source.queries()[0].doi_prefix.as_deref(), Some("10.1038"));
    }
}
