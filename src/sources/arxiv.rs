//! arXiv source implementation.

use async_trait::async_trait;
use chrono::Datelike;
use feed_rs::parser;
use std::sync::Arc;

use crate::models::CitationRecord;
use crate::sources::{parse_base_url, titled, SearchQuery, Source, SourceCapabilities, SourceError};
use crate::utils::{ApiRequest, HttpClient};

/// Base URL for arXiv API
const ARXIV_API_BASE: &str = "http://export.arxiv.org/api";

/// arXiv source
///
/// Supports:
/// - Lookup by arXiv ID (`id_list`)
/// - Title search (`search_query` over the Atom API)
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: Arc<HttpClient>,
    base_url: String,
}

impl ArxivSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: ARXIV_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, SourceError> {
        self.base_url = parse_base_url(self.id(), base_url)?;
        Ok(self)
    }

    pub fn with_base_url_opt(self, base_url: Option<&str>) -> Result<Self, SourceError> {
        match base_url {
            Some(url) => self.with_base_url(url),
            None => Ok(self),
        }
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get(self.id(), format!("{}/query", self.base_url))
    }

    /// Build search query for arXiv API
    fn build_search_query(query: &SearchQuery) -> String {
        let mut parts = Vec::new();

        let words = query
            .text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>();
        if !words.is_empty() {
            parts.push(format!("ti:\"{}\"", words.join(" ")));
        }

        // every term is a conjunct here, so the author is left to the scorer
        if let Some((from, until)) = query.year_range() {
            parts.push(format!(
                "submittedDate:[{}01010000 TO {}12312359]",
                from, until
            ));
        }

        parts.join(" AND ")
    }
}

/// Parse an Atom feed into records, skipping error entries
fn parse_feed(body: &str) -> Result<Vec<CitationRecord>, SourceError> {
    let feed = parser::parse(body.as_bytes())
        .map_err(|e| SourceError::Parse(format!("Failed to parse arXiv feed: {}", e)))?;

    Ok(feed
        .entries
        .iter()
        .map(parse_entry)
        .filter(|r| r.arxiv_id.is_some())
        .collect())
}

/// Parse arXiv Atom feed entry into a record
fn parse_entry(entry: &feed_rs::model::Entry) -> CitationRecord {
    // Entry IDs look like http://arxiv.org/abs/1706.03762v5
    let arxiv_id = entry.id.split("/abs/").nth(1).unwrap_or_default();

    let title = entry
        .title
        .as_ref()
        .map(|t| collapse_whitespace(&t.content))
        .unwrap_or_default();

    let abstract_text = entry
        .summary
        .as_ref()
        .map(|s| collapse_whitespace(&s.content))
        .unwrap_or_default();

    let doi = entry
        .links
        .iter()
        .find(|l| l.title.as_deref() == Some("doi"))
        .map(|l| l.href.as_str())
        .unwrap_or_default();

    CitationRecord::builder()
        .title(title)
        .authors(entry.authors.iter().map(|a| a.name.as_str()))
        .year_opt(entry.published.map(|d| d.year()))
        .venue("arXiv")
        .arxiv_id(arxiv_id)
        .doi(doi)
        .url(&entry.id)
        .abstract_text(abstract_text)
        .build()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::ARXIV_LOOKUP
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        let search_query = Self::build_search_query(query);
        if search_query.is_empty() {
            return Err(SourceError::InvalidRequest("Empty arXiv query".to_string()));
        }

        let request = self
            .request()
            .param("search_query", search_query)
            .param("start", 0)
            .param("max_results", query.max_results)
            .param("sortBy", "relevance");

        let records = self.client.fetch(&request, parse_feed).await?;
        Ok(titled(records, query.max_results))
    }

    async fn get_by_arxiv_id(&self, arxiv_id: &str) -> Result<CitationRecord, SourceError> {
        let request = self
            .request()
            .param("id_list", arxiv_id)
            .param("max_results", 1);

        self.client
            .fetch(&request, parse_feed)
            .await?
            .into_iter()
            .find(|r| r.title_text().is_some())
            .ok_or_else(|| SourceError::NotFound(format!("arXiv {} not found", arxiv_id)))
    }
}
