//! Semantic Scholar source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::CitationRecord;
use crate::sources::{parse_base_url, titled, SearchQuery, Source, SourceCapabilities, SourceError};
use crate::utils::{ApiRequest, HttpClient};

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Fields requested for every paper
const PAPER_FIELDS: &str = "title,authors,year,venue,journal,externalIds,url,abstract";

/// Semantic Scholar source
///
/// Uses the Graph API. Resolves DOIs, PMIDs and arXiv IDs through the
/// `/paper/{prefix}:{id}` endpoint and searches with `/paper/search`.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self {
            client,
            base_url: SEMANTIC_API_BASE.to_string(),
            api_key: None,
        }
    }

    /// Set an API key (optional, for higher rate limits)
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
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

    /// Build a request with the API key header if available
    fn request(&self, endpoint: &str) -> ApiRequest {
        let request = ApiRequest::get(self.id(), format!("{}{}", self.base_url, endpoint))
            .param("fields", PAPER_FIELDS);
        match &self.api_key {
            Some(key) => request.header("x-api-key", key.clone()),
            None => request,
        }
    }

    async fn get_paper(&self, external_id: &str) -> Result<CitationRecord, SourceError> {
        let request = self.request(&format!("/paper/{}", external_id));
        let record = self
            .client
            .fetch(&request, |body| {
                let paper: S2Paper = serde_json::from_str(body)?;
                Ok(parse_paper(paper))
            })
            .await?;

        if record.title_text().is_none() {
            return Err(SourceError::NotFound(format!(
                "Semantic Scholar has no title for {}",
                external_id
            )));
        }
        Ok(record)
    }
}

/// Parse Semantic Scholar paper data
fn parse_paper(data: S2Paper) -> CitationRecord {
    let ids = data.external_ids.unwrap_or_default();
    let journal = data.journal.unwrap_or_default();

    let venue = journal
        .name
        .filter(|n| !n.trim().is_empty())
        .or(data.venue)
        .unwrap_or_default();

    CitationRecord::builder()
        .title(data.title.unwrap_or_default())
        .authors(data.authors.into_iter().filter_map(|a| a.name))
        .year_opt(data.year)
        .venue(venue)
        .volume(journal.volume.unwrap_or_default())
        .pages(journal.pages.unwrap_or_default())
        .doi(ids.doi.unwrap_or_default())
        .pmid(ids.pubmed.unwrap_or_default())
        .arxiv_id(ids.arxiv.unwrap_or_default())
        .url(data.url.unwrap_or_default())
        .abstract_text(data.abstract_text.unwrap_or_default())
        .build()
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic_scholar"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
            | SourceCapabilities::DOI_LOOKUP
            | SourceCapabilities::PMID_LOOKUP
            | SourceCapabilities::ARXIV_LOOKUP
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<CitationRecord>, SourceError> {
        let request = self
            .request("/paper/search")
            .param("query", query.free_text())
            .param("limit", query.max_results)
            .param_opt(
                "year",
                query
                    .year_range()
                    .map(|(from, until)| format!("{}-{}", from, until)),
            );

        let max_results = query.max_results;
        self.client
            .fetch(&request, |body| {
                let response: S2SearchResponse = serde_json::from_str(body)?;
                Ok(titled(
                    response.data.into_iter().map(parse_paper),
                    max_results,
                ))
            })
            .await
    }

    async fn get_by_doi(&self, doi: &str) -> Result<CitationRecord, SourceError> {
        self.get_paper(&format!("DOI:{}", doi)).await
    }

    async fn get_by_pmid(&self, pmid: &str) -> Result<CitationRecord, SourceError> {
        self.get_paper(&format!("PMID:{}", pmid)).await
    }

    async fn get_by_arxiv_id(&self, arxiv_id: &str) -> Result<CitationRecord, SourceError> {
        self.get_paper(&format!("ARXIV:{}", arxiv_id)).await
    }
}

// ===== Semantic Scholar API Types =====

#[derive(Debug, Deserialize)]
struct S2Paper {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    year: Option<i32>,
    venue: Option<String>,
    journal: Option<S2Journal>,
    #[serde(rename = "externalIds")]
    external_ids: Option<S2ExternalIds>,
    url: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct S2Journal {
    name: Option<String>,
    volume: Option<String>,
    pages: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}
