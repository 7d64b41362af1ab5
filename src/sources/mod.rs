//! Bibliographic source adapters with an extensible trait-based architecture.
//!
//! This module defines the [`Source`] trait that every catalog adapter
//! implements. Each adapter turns its service's schema into the canonical
//! [`CitationRecord`], so the matching code never sees service quirks. New
//! sources are added by implementing the trait and registering them with the
//! [`SourceRegistry`]; registration order is lookup priority.
//!
//! # Built-in sources
//!
//! | ID | Service | Capabilities |
//! |----|---------|--------------|
//! | `crossref` | CrossRef REST API | DOI lookup, search, author search, DOI-prefix search |
//! | `pubmed` | NCBI E-utilities | PMID lookup, search, author search |
//! | `arxiv` | arXiv Atom API | arXiv lookup, search |
//! | `semantic_scholar` | Semantic Scholar Graph API | DOI/PMID/arXiv lookup, search |
//! | `openalex` | OpenAlex | DOI/PMID lookup, search, author search |
//! | `web` | DuckDuckGo HTML results | search (slow, fallback only) |
//!
//! # Runtime configuration
//!
//! Sources listed in `[sources] disabled` are never registered, and the web
//! adapter is only registered when `web_search_enabled` is true. Base URLs can
//! be overridden per source ID through `[sources.base_urls]`.

mod arxiv;
mod crossref;
pub mod mock;
mod openalex;
mod pubmed;
mod registry;
mod semantic;
mod web;

pub use arxiv::ArxivSource;
pub use crossref::CrossRefSource;
pub use mock::MockSource;
pub use openalex::OpenAlexSource;
pub use pubmed::PubMedSource;
pub use registry::{SourceCapabilities, SourceRegistry};
pub use semantic::SemanticScholarSource;
pub use web::WebSearchSource;

use crate::models::{CitationRecord, IdentifierKind};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Widest year gap the scorer still credits
pub const YEAR_TOLERANCE: i32 = 2;

/// Free-text search parameters passed to [`Source::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Title or keyword text
    pub text: String,

    /// Author name (usually the first author's surname)
    pub author: Option<String>,

    /// Cited publication year, applied as a [`SearchQuery::year_range`] window
    pub year: Option<i32>,

    /// Restrict results to a DOI registrant prefix such as `10.1038`
    pub doi_prefix: Option<String>,

    /// Maximum candidates to return
    pub max_results: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: None,
            year: None,
            doi_prefix: None,
            max_results: 5,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn doi_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.doi_prefix = Some(prefix.into());
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Text and author surname as one free-text query
    pub fn free_text(&self) -> String {
        match &self.author {
            Some(author) => format!("{} {}", self.text, author),
            None => self.text.clone(),
        }
    }

    /// Text, author and year joined into one free-text query, for services
    /// without separate fields
    pub fn combined_text(&self) -> String {
        match self.year {
            Some(year) => format!("{} {}", self.free_text(), year),
            None => self.free_text(),
        }
    }

    /// Inclusive publication-year window around the cited year.
    ///
    /// Cited years are often off by one or two (preprint versus print), and
    /// the scorer still rewards those gaps, so searches never filter on the
    /// exact year.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        self.year.map(|y| {
            (
                y.saturating_sub(YEAR_TOLERANCE),
                y.saturating_add(YEAR_TOLERANCE),
            )
        })
    }
}

/// The Source trait defines the interface for all bibliographic adapters.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Implement `id`, `name` and `capabilities`
/// 3. Implement the lookup and search methods the capabilities advertise
/// 4. Register it with [`SourceRegistry::register`]
///
/// Every method makes at most one HTTP call per request it needs and never
/// retries; failures are returned to the caller, which decides how to proceed.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier, also used as the rate-limit and logging key
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    /// Whether this source supports free-text search
    fn supports_search(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::SEARCH)
    }

    /// Whether this source resolves the given identifier kind
    fn supports_identifier(&self, kind: IdentifierKind) -> bool {
        self.capabilities()
            .contains(SourceCapabilities::for_identifier(kind))
    }

    /// Whether this source supports author search
    fn supports_author_search(&self) -> bool {
        self.capabilities()
            .contains(SourceCapabilities::AUTHOR_SEARCH)
    }

    /// Whether calls to this source are slow or fragile enough to be kept
    /// out of the regular search tier
    fn is_slow(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::SLOW)
    }

    // ========== SEARCH METHODS ==========

    /// Search for works matching the query, best match first
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Search for works by an author, optionally limited to one year
    async fn search_by_author(
        &self,
        _author: &str,
        _max_results: usize,
        _year: Option<i32>,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    // ========== LOOKUP METHODS ==========

    /// Get a work by its DOI
    async fn get_by_doi(&self, _doi: &str) -> Result<CitationRecord, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Get a work by its PubMed ID
    async fn get_by_pmid(&self, _pmid: &str) -> Result<CitationRecord, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Get a work by its arXiv ID
    async fn get_by_arxiv_id(&self, _arxiv_id: &str) -> Result<CitationRecord, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Resolve any supported identifier
    async fn resolve(&self, kind: IdentifierKind, id: &str) -> Result<CitationRecord, SourceError> {
        match kind {
            IdentifierKind::Doi => self.get_by_doi(id).await,
            IdentifierKind::Pmid => self.get_by_pmid(id).await,
            IdentifierKind::Arxiv => self.get_by_arxiv_id(id).await,
        }
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// HTTP 429 from the named service
    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    /// HTTP 5xx
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Any other non-success status
    #[error("HTTP error: {0}")]
    Http(u16),

    /// Work not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Parsing error (XML, JSON, HTML)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SourceError {
    /// Failures that might succeed if tried again later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_)
                | SourceError::Timeout(_)
                | SourceError::RateLimited(_)
                | SourceError::Server(_)
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

/// Validate a base URL override, dropping any trailing slash
pub(crate) fn parse_base_url(source: &str, base_url: &str) -> Result<String, SourceError> {
    let parsed = url::Url::parse(base_url).map_err(|e| {
        SourceError::Configuration(format!("invalid base URL for {}: {}", source, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SourceError::Configuration(format!(
            "base URL for {} must be http(s): {}",
            source, base_url
        )));
    }
    Ok(base_url.trim_end_matches('/').to_string())
}

/// Remove inline markup (JATS, HTML) and collapse whitespace
pub(crate) fn strip_tags(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    tag.replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the first `max` records that carry a title
pub(crate) fn titled(records: impl IntoIterator<Item = CitationRecord>, max: usize) -> Vec<CitationRecord> {
    records
        .into_iter()
        .filter(|r| r.title_text().is_some())
        .take(max)
        .collect()
}
