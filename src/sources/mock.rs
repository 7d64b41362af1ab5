//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::models::{CitationRecord, IdentifierKind};
use crate::sources::{SearchQuery, Source, SourceCapabilities, SourceError};

/// A programmable source that returns predefined records and counts calls.
///
/// Responses are configured up front with the `with_*` methods. Searches
/// return the results registered for the exact query text, falling back to
/// the default search results. No network access is involved.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    capabilities: SourceCapabilities,
    records: HashMap<(IdentifierKind, String), CitationRecord>,
    search_results: Vec<CitationRecord>,
    search_results_by_text: HashMap<String, Vec<CitationRecord>>,
    author_results: Vec<CitationRecord>,
    failure_status: Option<u16>,
    delay: Option<Duration>,
    search_calls: AtomicUsize,
    author_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    queries: Mutex<Vec<SearchQuery>>,
}

impl MockSource {
    /// Create a searchable mock with the given ID and no data.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: SourceCapabilities::SEARCH,
            records: HashMap::new(),
            search_results: Vec::new(),
            search_results_by_text: HashMap::new(),
            author_results: Vec::new(),
            failure_status: None,
            delay: None,
            search_calls: AtomicUsize::new(0),
            author_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Resolve `id` of the given kind to `record`
    pub fn with_record(
        mut self,
        kind: IdentifierKind,
        id: impl Into<String>,
        record: CitationRecord,
    ) -> Self {
        self.records.insert((kind, id.into()), record);
        self
    }

    /// Results for any search without a text-specific entry
    pub fn with_search_results(mut self, results: Vec<CitationRecord>) -> Self {
        self.search_results = results;
        self
    }

    /// Results for searches whose text is exactly `text`
    pub fn with_search_results_for(
        mut self,
        text: impl Into<String>,
        results: Vec<CitationRecord>,
    ) -> Self {
        self.search_results_by_text.insert(text.into(), results);
        self
    }

    pub fn with_author_results(mut self, results: Vec<CitationRecord>) -> Self {
        self.author_results = results;
        self
    }

    /// Fail every call as if the service answered with this HTTP status
    pub fn fail_with_status(mut self, status: u16) -> Self {
        self.failure_status = Some(status);
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn author_calls(&self) -> usize {
        self.author_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls() + self.author_calls() + self.lookup_calls()
    }

    /// Search queries received so far, in order
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn respond(&self) -> Result<(), SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure_status {
            Some(429) => Err(SourceError::RateLimited(self.id.clone())),
            Some(status) if status >= 500 => Err(SourceError::Server(status)),
            Some(404) => Err(SourceError::NotFound(format!("{} returned 404", self.id))),
            Some(status) => Err(SourceError::Http(status)),
            None => Ok(()),
        }
    }

    async fn lookup(&self, kind: IdentifierKind, id: &str) -> Result<CitationRecord, SourceError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        self.records
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{} {} not in {}", kind, id, self.id)))
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.clone());
        self.respond().await?;

        let results = self
            .search_results_by_text
            .get(&query.text)
            .unwrap_or(&self.search_results);
        Ok(results.iter().take(query.max_results).cloned().collect())
    }

    async fn search_by_author(
        &self,
        _author: &str,
        max_results: usize,
        _year: Option<i32>,
    ) -> Result<Vec<CitationRecord>, SourceError> {
        self.author_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self.author_results.iter().take(max_results).cloned().collect())
    }

    async fn get_by_doi(&self, doi: &str) -> Result<CitationRecord, SourceError> {
        self.lookup(IdentifierKind::Doi, doi).await
    }

    async fn get_by_pmid(&self, pmid: &str) -> Result<CitationRecord, SourceError> {
        self.lookup(IdentifierKind::Pmid, pmid).await
    }

    async fn get_by_arxiv_id(&self, arxiv_id: &str) -> Result<CitationRecord, SourceError> {
        self.lookup(IdentifierKind::Arxiv, arxiv_id).await
    }
}
