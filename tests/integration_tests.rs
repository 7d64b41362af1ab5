//! Integration tests for Citation Auditor
//!
//! These tests drive the lookup orchestrator and the audit pipeline over
//! programmable mock sources, so no network access is needed.

use citation_auditor::audit::{Auditor, CitingPaper};
use citation_auditor::config::Config;
use citation_auditor::lookup::CitationLookup;
use citation_auditor::matching::ScoreBreakdown;
use citation_auditor::models::{
    CitationContext, CitationRecord, CitationStatus, IdentifierKind, LookupTier, ReferenceEntry,
};
use citation_auditor::sources::{MockSource, SourceCapabilities, SourceRegistry};
use citation_auditor::utils::{fingerprint, LookupCache};
use std::sync::Arc;
use std::time::Duration;

/// Mock with the capabilities of the built-in source of the same ID
fn mock(id: &str) -> MockSource {
    let extra = match id {
        "crossref" => {
            SourceCapabilities::DOI_LOOKUP
                | SourceCapabilities::AUTHOR_SEARCH
                | SourceCapabilities::PREFIX_SEARCH
        }
        "pubmed" => SourceCapabilities::PMID_LOOKUP | SourceCapabilities::AUTHOR_SEARCH,
        "arxiv" => SourceCapabilities::ARXIV_LOOKUP,
        "semantic_scholar" => {
            SourceCapabilities::DOI_LOOKUP
                | SourceCapabilities::PMID_LOOKUP
                | SourceCapabilities::ARXIV_LOOKUP
        }
        "openalex" => {
            SourceCapabilities::DOI_LOOKUP
                | SourceCapabilities::PMID_LOOKUP
                | SourceCapabilities::AUTHOR_SEARCH
        }
        "web" => SourceCapabilities::SLOW,
        _ => SourceCapabilities::empty(),
    };
    MockSource::new(id).with_capabilities(SourceCapabilities::SEARCH | extra)
}

/// The six built-in services, mocked, in registry order
struct Sources {
    crossref: Arc<MockSource>,
    pubmed: Arc<MockSource>,
    arxiv: Arc<MockSource>,
    semantic_scholar: Arc<MockSource>,
    openalex: Arc<MockSource>,
    web: Arc<MockSource>,
}

impl Sources {
    fn new() -> Self {
        Self {
            crossref: Arc::new(mock("crossref")),
            pubmed: Arc::new(mock("pubmed")),
            arxiv: Arc::new(mock("arxiv")),
            semantic_scholar: Arc::new(mock("semantic_scholar")),
            openalex: Arc::new(mock("openalex")),
            web: Arc::new(mock("web")),
        }
    }

    fn all(&self) -> Vec<Arc<MockSource>> {
        vec![
            self.crossref.clone(),
            self.pubmed.clone(),
            self.arxiv.clone(),
            self.semantic_scholar.clone(),
            self.openalex.clone(),
            self.web.clone(),
        ]
    }

    fn search_calls(&self) -> usize {
        self.all().iter().map(|s| s.search_calls()).sum()
    }

    fn author_calls(&self) -> usize {
        self.all().iter().map(|s| s.author_calls()).sum()
    }

    fn total_calls(&self) -> usize {
        self.all().iter().map(|s| s.total_calls()).sum()
    }

    fn registry(&self) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for source in self.all() {
            registry.register(source);
        }
        registry
    }

    fn lookup_with_cache(&self, cache: LookupCache) -> CitationLookup {
        CitationLookup::new(self.registry(), cache, &Config::default())
    }

    fn lookup(&self) -> CitationLookup {
        self.lookup_with_cache(LookupCache::new(100, Duration::from_secs(3600)))
    }
}

fn attention_paper() -> CitationRecord {
    CitationRecord::builder()
        .title("Attention Is All You Need")
        .authors(["Vaswani, Ashish", "Shazeer, Noam"])
        .year(2017)
        .venue("Advances in Neural Information Processing Systems")
        .doi("10.5555/example")
        .arxiv_id("1706.03762")
        .build()
}

fn title_query(title: &str) -> CitationRecord {
    CitationRecord::builder().title(title).build()
}

/// Test that a Tier 1 hit returns the fixed confidence without searching
#[tokio::test]
async fn test_doi_short_circuit() {
    let sources = Sources {
        crossref: Arc::new(mock("crossref").with_record(
            IdentifierKind::Doi,
            "10.5555/example",
            attention_paper(),
        )),
        ..Sources::new()
    };

    let query = CitationRecord::builder()
        .title("Attention is All You Need")
        .author("Vaswani, A.")
        .year(2017)
        .doi("10.5555/example")
        .build();
    let result = sources.lookup().lookup(&query, true).await;

    assert!(result.found());
    assert_eq!(result.source().unwrap().as_str(), "doi");
    assert_eq!(result.tier(), Some(LookupTier::Identifier));
    assert_eq!(result.confidence(), 0.95);
    assert_eq!(sources.search_calls(), 0);
    assert_eq!(sources.author_calls(), 0);
    // the arXiv ID on the catalog record makes full text available
    assert!(result.full_text_available());
}

/// Test that secondary resolvers run after the primary one misses
#[tokio::test]
async fn test_secondary_identifier_resolver() {
    let sources = Sources {
        semantic_scholar: Arc::new(mock("semantic_scholar").with_record(
            IdentifierKind::Pmid,
            "31452104",
            title_query("A PubMed indexed paper"),
        )),
        ..Sources::new()
    };

    let query = CitationRecord::builder().pmid("PMID: 31452104").build();
    let result = sources.lookup().lookup(&query, true).await;

    assert!(result.found());
    assert_eq!(result.source().unwrap().as_str(), "semantic_scholar_pmid");
    assert_eq!(sources.pubmed.lookup_calls(), 1);
    // the query's identifier fills the gap in the catalog record
    assert_eq!(result.record().unwrap().pmid.as_deref(), Some("31452104"));
}

/// Test that an unknown title exhausts every tier and reports nothing
#[tokio::test]
async fn test_fabricated_title_not_found() {
    let sources = Sources::new();
    let query = title_query("Completely Fabricated Nonexistent Paper Title 12345");

    let result = sources.lookup().lookup(&query, true).await;

    assert!(!result.found());
    assert_eq!(result.confidence(), 0.0);
    assert!(result.record().is_none());
    assert!(result.source().is_none());
    // the slow web source is only reached by the fallback tier
    assert!(sources.web.search_calls() > 0);
    assert_eq!(result.details()["fallbacks_attempted"], true);
}

/// Test that disabling fallbacks skips every Tier 3 strategy
#[tokio::test]
async fn test_fallback_gating() {
    let sources = Sources::new();
    let query = CitationRecord::builder()
        .title("Completely Fabricated Nonexistent Paper Title 12345")
        .author("Nobody, N.")
        .year(2021)
        .doi("10.9999/fabricated")
        .build();

    let result = sources.lookup().lookup(&query, false).await;

    assert!(!result.found());
    assert_eq!(sources.web.search_calls(), 0);
    assert_eq!(sources.author_calls(), 0);
    // one title search per non-slow source
    assert_eq!(sources.search_calls(), 5);
    for source in sources.all() {
        assert!(source.queries().iter().all(|q| q.doi_prefix.is_none()));
    }
}

/// Test that a warm cache answers without calling any source
#[tokio::test]
async fn test_cached_lookup_is_idempotent() {
    let sources = Sources {
        crossref: Arc::new(mock("crossref").with_search_results(vec![attention_paper()])),
        ..Sources::new()
    };
    let lookup = sources.lookup();
    let query = title_query("Attention is all you need");

    let first = lookup.lookup(&query, true).await;
    let calls = sources.total_calls();
    let second = lookup.lookup(&query, true).await;

    assert!(first.found());
    assert_eq!(sources.total_calls(), calls);
    assert_eq!(first, second);
}

/// Test that concurrent lookups of one citation share a single computation
#[tokio::test]
async fn test_concurrent_lookups_coalesce() {
    let sources = Sources {
        crossref: Arc::new(
            mock("crossref")
                .with_search_results(vec![attention_paper()])
                .with_delay(Duration::from_millis(200)),
        ),
        ..Sources::new()
    };
    let lookup = sources.lookup();
    let query = title_query("Attention is all you need");

    let (a, b) = tokio::join!(lookup.lookup(&query, false), lookup.lookup(&query, false));

    assert_eq!(a, b);
    assert_eq!(sources.crossref.search_calls(), 1);
}

/// Test that entries expire after their TTL
#[tokio::test]
async fn test_cache_ttl_expiry() {
    let sources = Sources {
        crossref: Arc::new(mock("crossref").with_search_results(vec![attention_paper()])),
        ..Sources::new()
    };
    let cache = LookupCache::new(100, Duration::from_secs(1));
    let lookup = sources.lookup_with_cache(cache.clone());
    let query = title_query("Attention is all you need");

    lookup.lookup(&query, false).await;
    assert_eq!(sources.crossref.search_calls(), 1);
    let key = fingerprint(&query.normalized());
    assert!(cache.get(&key).await.is_some());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(cache.get(&key).await.is_none());
    lookup.lookup(&query, false).await;
    assert_eq!(sources.crossref.search_calls(), 2);
}

/// Test that the title component dominates candidate selection
#[tokio::test]
async fn test_title_dominates_selection() {
    let strong_title = CitationRecord::builder()
        .title("Attention is all you need")
        .year(2017)
        .build();
    let strong_authors = CitationRecord::builder()
        .title("Attention mechanisms in recurrent neural networks")
        .author("Vaswani, A.")
        .year(2014)
        .build();
    let sources = Sources {
        // the weaker candidate is ranked first by the service
        crossref: Arc::new(
            mock("crossref").with_search_results(vec![strong_authors, strong_title]),
        ),
        ..Sources::new()
    };

    let query = CitationRecord::builder()
        .title("Attention Is All You Need")
        .author("Vaswani, A.")
        .year(2017)
        .build();
    let result = sources.lookup().lookup(&query, false).await;

    assert!(result.found());
    assert_eq!(result.record().unwrap().year, Some(2017));
    assert!(result.confidence() > 0.9);
}

/// Test the documented weighting of the two-candidate example
#[test]
fn test_two_candidate_weights() {
    let title_only = ScoreBreakdown::from_components(Some(0.9), Some(1.0), None);
    let authors_exact = ScoreBreakdown::from_components(Some(0.5), Some(0.0), Some(1.0));

    assert!((title_only.total - 0.925).abs() < 1e-9);
    assert!((authors_exact.total - 0.5).abs() < 1e-9);
    assert!(title_only.total > authors_exact.total);
}

/// Test that a rate-limited service does not abort the lookup
#[tokio::test]
async fn test_rate_limited_source_is_skipped() {
    let sources = Sources {
        crossref: Arc::new(mock("crossref").fail_with_status(429)),
        pubmed: Arc::new(mock("pubmed").with_search_results(vec![attention_paper()])),
        ..Sources::new()
    };

    let result = sources
        .lookup()
        .lookup(&title_query("Attention is all you need"), false)
        .await;

    assert!(result.found());
    assert_eq!(result.source().unwrap().as_str(), "pubmed_search");
    let attempts = &result.details()["attempts"];
    assert_eq!(attempts[0]["strategy"], "crossref_search");
    assert_eq!(attempts[0]["outcome"], "error");
    assert_eq!(attempts[1]["outcome"], "matched");
}

/// Test that server errors on every source still produce a clean miss
#[tokio::test]
async fn test_all_sources_failing() {
    let sources = Sources {
        crossref: Arc::new(mock("crossref").fail_with_status(503)),
        pubmed: Arc::new(mock("pubmed").fail_with_status(500)),
        arxiv: Arc::new(mock("arxiv").fail_with_status(502)),
        semantic_scholar: Arc::new(mock("semantic_scholar").fail_with_status(429)),
        openalex: Arc::new(mock("openalex").fail_with_status(400)),
        web: Arc::new(mock("web").fail_with_status(503)),
    };

    let result = sources
        .lookup()
        .lookup(&title_query("Deep learning"), true)
        .await;

    assert!(!result.found());
    assert_eq!(result.confidence(), 0.0);
}

/// Test that the slow web source is reached through title variants
#[tokio::test]
async fn test_variant_search_fallback() {
    let sources = Sources {
        web: Arc::new(mock("web").with_search_results(vec![attention_paper()])),
        ..Sources::new()
    };
    let query = title_query("Attention Is All You Need");

    let without = sources.lookup().lookup(&query, false).await;
    assert!(!without.found());

    let with = sources.lookup().lookup(&query, true).await;
    assert!(with.found());
    assert_eq!(with.source().unwrap().as_str(), "web_fallback");
    assert_eq!(with.tier(), Some(LookupTier::Fallback));
    assert!(with.confidence() >= 0.5);
}

/// Test that author and year find a paper when title searches miss
#[tokio::test]
async fn test_author_year_fallback() {
    let sources = Sources {
        crossref: Arc::new(mock("crossref").with_author_results(vec![attention_paper()])),
        ..Sources::new()
    };
    let query = CitationRecord::builder()
        .title("Attention is all you need")
        .author("Vaswani, A.")
        .year(2017)
        .build();

    let result = sources.lookup().lookup(&query, true).await;

    assert!(result.found());
    assert_eq!(result.source().unwrap().as_str(), "crossref_author_year");
    assert_eq!(sources.crossref.author_calls(), 1);
}

/// Test that a slow lookup times out without caching anything
#[tokio::test]
async fn test_lookup_timeout() {
    let sources = Sources {
        crossref: Arc::new(
            mock("crossref")
                .with_search_results(vec![attention_paper()])
                .with_delay(Duration::from_secs(2)),
        ),
        ..Sources::new()
    };
    let lookup = sources.lookup();

    let result = lookup
        .lookup_with_timeout(
            &title_query("Attention is all you need"),
            false,
            Duration::from_millis(100),
        )
        .await;

    assert!(!result.found());
    assert_eq!(result.details()["timed_out"], true);
    assert!(lookup.cache().is_empty().await);
}

/// Test that repeated runs over fresh state choose the same candidate
#[test]
fn test_lookup_is_deterministic() {
    let run = || {
        let candidates = vec![
            CitationRecord::builder()
                .title("Attention is all you need")
                .url("https://a.example")
                .build(),
            CitationRecord::builder()
                .title("Attention is all you need")
                .url("https://b.example")
                .build(),
        ];
        let sources = Sources {
            crossref: Arc::new(mock("crossref").with_search_results(candidates)),
            ..Sources::new()
        };
        tokio_test::block_on(
            sources
                .lookup()
                .lookup(&title_query("Attention is all you need"), false),
        )
    };

    let first = run();
    assert_eq!(first.record().unwrap().url.as_deref(), Some("https://a.example"));
    for _ in 0..5 {
        assert_eq!(run(), first);
    }
}

/// Test that batch lookups keep the input order
#[tokio::test]
async fn test_lookup_many_preserves_order() {
    let sources = Sources {
        crossref: Arc::new(
            mock("crossref").with_search_results_for("Attention is all you need", vec![attention_paper()]),
        ),
        ..Sources::new()
    };
    let queries = vec![
        title_query("Completely Fabricated Nonexistent Paper Title 12345"),
        title_query("Attention is all you need"),
        title_query("Another fabricated title that matches nothing"),
    ];

    let results = sources.lookup().lookup_many(&queries, false, 3).await;

    let found: Vec<bool> = results.iter().map(|r| r.found()).collect();
    assert_eq!(found, vec![false, true, false]);
}

/// Test the audit pipeline over found and missing references
#[tokio::test]
async fn test_audit_report() {
    let transformer = CitationRecord::builder()
        .title("Attention Is All You Need")
        .author("Vaswani, Ashish")
        .year(2017)
        .abstract_text("We propose the Transformer, based solely on attention mechanisms.")
        .build();
    let sources = Sources {
        crossref: Arc::new(
            mock("crossref").with_search_results_for("Attention is all you need", vec![transformer]),
        ),
        ..Sources::new()
    };
    let auditor = Auditor::new(sources.lookup(), &Config::default())
        .with_fallbacks(false)
        .with_max_concurrent(2);

    let entries = vec![
        ReferenceEntry {
            key: "vaswani2017".to_string(),
            original_text: "Vaswani et al. Attention is all you need. 2017.".to_string(),
            record: title_query("Attention is all you need"),
            contexts: vec![CitationContext {
                surrounding_text: "Transformer models rely entirely on attention mechanisms."
                    .to_string(),
                claim_statement: "Transformer models rely entirely on attention mechanisms."
                    .to_string(),
                ..Default::default()
            }],
        },
        ReferenceEntry {
            key: "ghost2020".to_string(),
            original_text: "Ghost, G. A paper that does not exist. 2020.".to_string(),
            record: title_query("A paper that does not exist"),
            contexts: Vec::new(),
        },
    ];

    let paper = CitingPaper::new("Efficient attention mechanisms for transformer models");
    let report = auditor.audit(&paper, entries).await;

    assert_eq!(report.total_citations, 2);
    assert_eq!(report.citations[0].key, "vaswani2017");
    assert_eq!(report.citations[1].key, "ghost2020");
    assert_eq!(report.citations[1].status, CitationStatus::Missing);
    assert!(report.citations[1].relevance.is_none());
    assert_eq!(report.missing_count, 1);

    let found = &report.citations[0];
    assert!(found.lookup.found());
    assert!(found.relevance.is_some());
    assert!(found.justification.as_ref().unwrap().justified);
    assert_eq!(
        report.passed_count + report.suspect_count + report.missing_count,
        report.total_citations
    );
}
